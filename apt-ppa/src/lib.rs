// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Multi-source Debian APT repository service.

This crate implements the moving parts of a self-updating APT repository:
it polls a set of upstream *sources* for new releases, ingests the resulting
`.deb` artifacts into an object-storage bucket, and republishes signed
repository metadata (`Packages`, `Release`, `InRelease`, `Release.gpg`) that
stock APT clients consume over HTTP.

# A Tour of Functionality

`.deb` files are `ar` archives. The [ar] module implements a minimal
streaming reader and writer for the `ar` variant Debian uses. The [deb]
module builds on it: [deb::reader::parse_deb_control] extracts the control
paragraph from a binary package and [deb::builder::DebBuilder] produces new
`.deb` files from a control paragraph plus a set of filesystem entries.

Control metadata is modeled in the [control] module as ordered key/value
paragraphs ([control::ControlParagraph]), with
[control::BinaryPackageControl] adding the well-known binary package field
accessors.

The [index] module renders repository indices: per-package `Packages`
stanzas, the repository-wide concatenation, and the `Release` manifest with
its `MD5Sum`/`SHA1`/`SHA256` sections. [signer::GpgSigner] turns a
`Release` into its clearsigned (`InRelease`) and detached-signature
(`Release.gpg`) forms.

Storage is abstracted by [store::ObjectStore] with an S3 implementation
([store::S3Store]) and an in-memory implementation ([store::MemoryStore])
for tests and local experimentation.

[service::Ppa] is the orchestrator tying everything together: one polling
worker per registered [source::Source], change detection against persisted
state, the ingest path, and exclusive regeneration of repository metadata.
The [server] module is the read-side HTTP surface proxying bucket objects
to APT clients, and [fetch] holds the rate-limit-aware HTTP request helper
that source adapters build on.
*/

pub mod ar;
pub mod control;
pub mod deb;
pub mod error;
pub mod fetch;
pub mod index;
pub mod io;
pub mod server;
pub mod service;
pub mod signer;
pub mod source;
pub mod store;
