// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian binary package (`.deb`) reading and writing.

A `.deb` binary package is an `ar` archive with 3 members:

1. `debian-binary` holding the version of the binary package format.
2. `control.tar[.gz]` holding package metadata.
3. `data.tar[.gz]` holding file content.
*/

pub mod builder;
pub mod reader;

pub use {
    builder::{DebBuilder, DebEntry},
    reader::parse_deb_control,
};
