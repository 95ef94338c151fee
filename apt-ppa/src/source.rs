// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Upstream package source abstraction.

A *source* tells the repository what "latest" means upstream and produces
a `.deb` for it. Concrete adapters live outside this crate and typically
compose [crate::fetch::http_with_retry] and [crate::deb::DebBuilder].
*/

use {
    async_trait::async_trait,
    std::{sync::Arc, time::Duration},
    tokio_util::sync::CancellationToken,
};

/// A package source that can be polled for new versions.
///
/// Adapters report arbitrary errors (`anyhow`); the orchestrator logs them
/// and retries on the next poll cycle.
#[async_trait]
pub trait Source: Send + Sync {
    /// Source identifier, used for state storage keys and logging.
    fn name(&self) -> &str;

    /// Human-readable description of how the package is fetched and
    /// built, displayed on the index page.
    fn description(&self) -> String;

    /// Return a state string representing the current upstream version.
    ///
    /// The orchestrator compares this with the previously stored state to
    /// detect changes. An empty state is never persisted, so a source that
    /// cannot produce one is fetched on every cycle.
    async fn check(&self, cancel: &CancellationToken) -> anyhow::Result<String>;

    /// Download or build the `.deb` package bytes.
    ///
    /// Called only when `check` returned a different state than stored.
    async fn fetch(&self, cancel: &CancellationToken) -> anyhow::Result<Vec<u8>>;
}

/// A source paired with its polling interval.
#[derive(Clone)]
pub struct SourceRegistration {
    pub source: Arc<dyn Source>,
    pub poll_interval: Duration,
}

/// Name and description of a registered source, for display.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub name: String,
    pub description: String,
}

impl SourceInfo {
    pub fn for_source(source: &dyn Source) -> Self {
        Self {
            name: source.name().to_string(),
            description: source.description(),
        }
    }
}
