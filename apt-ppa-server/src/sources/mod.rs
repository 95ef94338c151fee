// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Concrete upstream package sources.

Each adapter implements [apt_ppa::source::Source]: it tells the
orchestrator what "latest" means upstream (`check`) and produces a `.deb`
for it (`fetch`), either by downloading a vendor-built package directly or
by repackaging a vendor tarball with the library's deb builder.
*/

mod discord;
mod postman;
mod zcli;

pub use {discord::DiscordSource, postman::PostmanSource, zcli::ZcliSource};

/// Cap applied when buffering upstream downloads.
pub(crate) const MAX_DOWNLOAD_SIZE: usize = 512 * 1024 * 1024;
