// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::MAX_DOWNLOAD_SIZE,
    anyhow::{anyhow, Result},
    apt_ppa::{fetch::http_with_retry, source::Source},
    async_trait::async_trait,
    reqwest::{Client, Method, StatusCode},
    serde::Deserialize,
    tokio_util::sync::CancellationToken,
};

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    browser_download_url: String,
}

/// Serves the Zerops CLI `.deb` from its GitHub releases.
pub struct ZcliSource {
    /// GitHub repository in `owner/repo` format.
    github_repo: String,
    client: Client,
}

impl ZcliSource {
    pub fn new(github_repo: impl ToString, client: Client) -> Self {
        Self {
            github_repo: github_repo.to_string(),
            client,
        }
    }

    async fn latest_release(&self, cancel: &CancellationToken) -> Result<GithubRelease> {
        let url = format!(
            "https://api.github.com/repos/{}/releases/latest",
            self.github_repo
        );

        let response = http_with_retry(&self.client, cancel, Method::GET, &url).await?;
        if response.status() != StatusCode::OK {
            return Err(anyhow!("GitHub API returned status {}", response.status()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Source for ZcliSource {
    fn name(&self) -> &str {
        "zcli"
    }

    fn description(&self) -> String {
        format!(
            "Zerops CLI for managing Zerops projects and services. Installs to \
             /usr/local/bin/zcli. The .deb is downloaded directly from GitHub releases of {}. \
             New versions are detected via the GitHub latest release API.",
            self.github_repo
        )
    }

    async fn check(&self, cancel: &CancellationToken) -> Result<String> {
        Ok(self.latest_release(cancel).await?.tag_name)
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let release = self.latest_release(cancel).await?;

        // Prefer the amd64 asset; fall back to any .deb.
        let mut deb_url = None;
        let mut fallback_url = None;
        for asset in &release.assets {
            if asset.browser_download_url.ends_with("_amd64.deb") {
                deb_url = Some(asset.browser_download_url.clone());
                break;
            }
            if asset.browser_download_url.ends_with(".deb") && fallback_url.is_none() {
                fallback_url = Some(asset.browser_download_url.clone());
            }
        }

        let url = deb_url
            .or(fallback_url)
            .ok_or_else(|| anyhow!("no .deb asset found in release {}", release.tag_name))?;

        let response = http_with_retry(&self.client, cancel, Method::GET, &url).await?;
        if response.status() != StatusCode::OK {
            return Err(anyhow!(
                "unexpected status {} downloading .deb",
                response.status()
            ));
        }

        let data = response.bytes().await?;
        if data.len() > MAX_DOWNLOAD_SIZE {
            return Err(anyhow!("download of {} bytes exceeds limit", data.len()));
        }

        Ok(data.to_vec())
    }
}
