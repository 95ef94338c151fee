// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::MAX_DOWNLOAD_SIZE,
    anyhow::{anyhow, Result},
    apt_ppa::{fetch::http_with_retry, source::Source},
    async_trait::async_trait,
    reqwest::{header, Client, Method, StatusCode},
    tokio_util::sync::CancellationToken,
};

/// Serves the official Discord `.deb` straight from Discord's download API.
pub struct DiscordSource {
    download_url: String,
    client: Client,
}

impl DiscordSource {
    pub fn new(download_url: impl ToString, client: Client) -> Self {
        Self {
            download_url: download_url.to_string(),
            client,
        }
    }
}

#[async_trait]
impl Source for DiscordSource {
    fn name(&self) -> &str {
        "discord"
    }

    fn description(&self) -> String {
        "Discord voice and text chat client. The official .deb is fetched directly from \
         Discord's download API. New versions are detected via ETag changes on the download URL."
            .to_string()
    }

    async fn check(&self, cancel: &CancellationToken) -> Result<String> {
        let response =
            http_with_retry(&self.client, cancel, Method::HEAD, &self.download_url).await?;

        if response.status() != StatusCode::OK {
            return Err(anyhow!("unexpected status {}", response.status()));
        }

        // Some CDN frontends omit the ETag; the content length is a usable
        // stand-in for change detection.
        let etag = response
            .headers()
            .get(header::ETAG)
            .or_else(|| response.headers().get(header::CONTENT_LENGTH))
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        Ok(etag.to_string())
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let response =
            http_with_retry(&self.client, cancel, Method::GET, &self.download_url).await?;

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
