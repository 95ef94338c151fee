// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum PpaError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("malformed ar archive: {0}")]
    MalformedArchive(String),

    #[error("ar header field parse error: {0}")]
    ParseError(String),

    #[error("unsupported compression in deb archive member: {0}")]
    UnsupportedCompression(String),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("invalid control file: {0}")]
    InvalidControl(String),

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("input of {0} bytes exceeds the maximum package size")]
    OversizeInput(usize),

    #[error("unsafe package name or version: {0:?}")]
    UnsafeName(String),

    #[error("signer initialization error: {0}")]
    SignerInit(String),

    #[error("object store initialization error: {0}")]
    StoreInit(String),

    #[error("object store error on key {0}: {1:?}")]
    Store(String, std::io::Error),

    #[error("rate limited after 3 retries")]
    RateLimited,

    #[error("operation cancelled")]
    Cancelled,
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, PpaError>;
