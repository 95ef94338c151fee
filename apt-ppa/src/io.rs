// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Content digest helpers.

Repository metadata advertises MD5, SHA-1, and SHA-256 digests for every
indexed file, so most hashing in this crate computes all three in one
pass via [MultiDigester].
*/

use {pgp::crypto::hash::Hasher, pgp_cleartext::CleartextHasher};

/// Represents a content digest.
#[derive(Clone, Eq, PartialEq)]
pub enum ContentDigest {
    /// An MD5 digest.
    Md5(Vec<u8>),
    /// A SHA-1 digest.
    Sha1(Vec<u8>),
    /// A SHA-256 digest.
    Sha256(Vec<u8>),
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5(data) => write!(f, "Md5({})", hex::encode(data)),
            Self::Sha1(data) => write!(f, "Sha1({})", hex::encode(data)),
            Self::Sha256(data) => write!(f, "Sha256({})", hex::encode(data)),
        }
    }
}

impl ContentDigest {
    /// Obtain the digest bytes.
    pub fn digest_bytes(&self) -> &[u8] {
        match self {
            Self::Md5(x) => x,
            Self::Sha1(x) => x,
            Self::Sha256(x) => x,
        }
    }

    /// Obtain the hex encoded digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }
}

/// Holds all digest flavors for a piece of content.
#[derive(Clone, Debug)]
pub struct MultiContentDigest {
    pub md5: ContentDigest,
    pub sha1: ContentDigest,
    pub sha256: ContentDigest,
}

/// A content digester that simultaneously computes multiple digest types.
pub struct MultiDigester {
    md5: Box<dyn Hasher + Send>,
    sha1: Box<dyn Hasher + Send>,
    sha256: Box<dyn Hasher + Send>,
}

impl Default for MultiDigester {
    fn default() -> Self {
        Self {
            md5: Box::new(CleartextHasher::md5()),
            sha1: Box::new(CleartextHasher::sha1()),
            sha256: Box::new(CleartextHasher::sha256()),
        }
    }
}

impl MultiDigester {
    /// Compute the digests of a byte slab in one shot.
    pub fn digest(data: &[u8]) -> MultiContentDigest {
        let mut digester = Self::default();
        digester.update(data);
        digester.finish()
    }

    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    /// Finish digesting, consuming the instance.
    pub fn finish(self) -> MultiContentDigest {
        MultiContentDigest {
            md5: ContentDigest::Md5(self.md5.finish()),
            sha1: ContentDigest::Sha1(self.sha1.finish()),
            sha256: ContentDigest::Sha256(self.sha256.finish()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        let digest = MultiDigester::digest(b"abc");

        assert_eq!(digest.md5.digest_hex(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            digest.sha1.digest_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digest.sha256.digest_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut digester = MultiDigester::default();
        digester.update(b"hello ");
        digester.update(b"world");
        let incremental = digester.finish();

        let oneshot = MultiDigester::digest(b"hello world");
        assert_eq!(incremental.sha256.digest_hex(), oneshot.sha256.digest_hex());
    }
}
