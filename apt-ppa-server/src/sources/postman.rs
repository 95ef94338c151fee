// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::MAX_DOWNLOAD_SIZE,
    anyhow::{anyhow, Context, Result},
    apt_ppa::{
        control::ControlParagraph,
        deb::{DebBuilder, DebEntry},
        fetch::http_with_retry,
        source::Source,
    },
    async_trait::async_trait,
    reqwest::{header, Client, Method, StatusCode},
    serde::Deserialize,
    std::{
        collections::BTreeSet,
        io::Read,
    },
    tokio_util::sync::CancellationToken,
};

const POSTMAN_DEPENDS: &str = "libgtk-3-0, libnotify4, libnss3, libxss1, libxtst6, xdg-utils, \
                               libatspi2.0-0, libuuid1, libsecret-1-0";

const POSTMAN_DESKTOP_ENTRY: &str = "[Desktop Entry]
Type=Application
Name=Postman
Comment=API Development Environment
Exec=/opt/Postman/Postman %U
Icon=/opt/Postman/app/resources/app/assets/icon.png
Terminal=false
Categories=Development;
StartupWMClass=postman
";

#[derive(Debug, Deserialize)]
struct PostmanPackageJson {
    version: String,
}

/// Repackages the official Postman Linux tarball into a `.deb`.
///
/// The tarball's `Postman/` tree lands under `/opt/`, with a
/// `/usr/bin/postman` symlink and a desktop entry added on top. The
/// version is read from the embedded `package.json`.
pub struct PostmanSource {
    download_url: String,
    maintainer: String,
    client: Client,
}

impl PostmanSource {
    pub fn new(download_url: impl ToString, maintainer: impl ToString, client: Client) -> Self {
        Self {
            download_url: download_url.to_string(),
            maintainer: maintainer.to_string(),
            client,
        }
    }

    fn build_deb(&self, tar_gz: &[u8]) -> Result<Vec<u8>> {
        let (extracted, version) = extract_tar_gz(tar_gz)?;

        let version = version.ok_or_else(|| anyhow!("could not determine Postman version"))?;

        let mut entries = Vec::new();

        // Parent directories for everything under /opt/.
        let mut dirs = BTreeSet::new();
        for entry in &extracted {
            let mut dir = parent_dir(&format!("/opt/{}", entry.path));
            while dir != "/" && !dir.is_empty() {
                dirs.insert(dir.to_string());
                dir = parent_dir(&dir);
            }
        }
        for dir in &dirs {
            entries.push(DebEntry::dir(dir, 0o755));
        }

        for entry in extracted {
            let mut entry = entry;
            entry.path = format!("/opt/{}", entry.path);
            entries.push(entry);
        }

        entries.push(DebEntry::dir("/usr", 0o755));
        entries.push(DebEntry::dir("/usr/bin", 0o755));
        entries.push(DebEntry::dir("/usr/share", 0o755));
        entries.push(DebEntry::dir("/usr/share/applications", 0o755));
        entries.push(DebEntry::symlink(
            "/usr/bin/postman",
            "/opt/Postman/Postman",
            0o777,
        ));
        entries.push(DebEntry::file(
            "/usr/share/applications/postman.desktop",
            POSTMAN_DESKTOP_ENTRY.as_bytes().to_vec(),
            0o644,
        ));

        // Installed size is advertised in KiB.
        let installed_bytes: usize = entries
            .iter()
            .filter_map(|e| e.body.as_ref().map(Vec::len))
            .sum();
        let installed_size = format!("{}", installed_bytes / 1024);

        let mut control = ControlParagraph::default();
        control.set_field_from_string("Package".into(), "postman".into());
        control.set_field_from_string("Version".into(), version.into());
        control.set_field_from_string("Architecture".into(), "amd64".into());
        control.set_field_from_string("Installed-Size".into(), installed_size.into());
        control.set_field_from_string("Maintainer".into(), self.maintainer.clone().into());
        control.set_field_from_string("Homepage".into(), "https://www.postman.com".into());
        control.set_field_from_string("Depends".into(), POSTMAN_DEPENDS.into());
        control.set_field_from_string("Section".into(), "devel".into());
        control.set_field_from_string("Priority".into(), "optional".into());
        control.set_field_from_string(
            "Description".into(),
            "Postman - API Development Environment\n Unofficial repackaging of the official \
             Postman Linux build."
                .into(),
        );

        let mut builder = DebBuilder::new(control);
        for entry in entries {
            builder = builder.add_entry(entry);
        }

        Ok(builder.build()?)
    }
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Extract regular files and symlinks under `Postman/` from the vendor
/// tarball, along with the version from the embedded `package.json`.
fn extract_tar_gz(data: &[u8]) -> Result<(Vec<DebEntry>, Option<String>)> {
    let mut entries = Vec::new();
    let mut version = None;

    let decoder = flate2::read::GzDecoder::new(data);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries().context("reading tar")? {
        let mut entry = entry.context("reading tar entry")?;

        let path = entry.path().context("reading tar entry path")?;
        let name = path.to_string_lossy().trim_end_matches('/').to_string();
        if !name.starts_with("Postman/") {
            continue;
        }

        let mode = entry.header().mode().unwrap_or(0o644) & 0o7777;

        match entry.header().entry_type() {
            tar::EntryType::Regular => {
                let mut body = Vec::new();
                (&mut entry)
                    .take(MAX_DOWNLOAD_SIZE as u64)
                    .read_to_end(&mut body)
                    .with_context(|| format!("reading {}", name))?;

                if name == "Postman/app/resources/app/package.json" {
                    if let Ok(pkg) = serde_json::from_slice::<PostmanPackageJson>(&body) {
                        if !pkg.version.is_empty() {
                            version = Some(pkg.version);
                        }
                    }
                }

                entries.push(DebEntry::file(&name, body, mode));
            }
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .context("reading symlink target")?
                    .map(|t| t.to_string_lossy().to_string())
                    .unwrap_or_default();
                entries.push(DebEntry::symlink(&name, target, mode));
            }
            _ => {}
        }
    }

    Ok((entries, version))
}

#[async_trait]
impl Source for PostmanSource {
    fn name(&self) -> &str {
        "postman"
    }

    fn description(&self) -> String {
        "Postman API development environment. Downloaded as a tar.gz from dl.pstmn.io, \
         extracted, and repackaged into a .deb with a desktop entry and /usr/bin/postman \
         symlink. Version is read from the embedded package.json."
            .to_string()
    }

    async fn check(&self, cancel: &CancellationToken) -> Result<String> {
        let response =
            http_with_retry(&self.client, cancel, Method::HEAD, &self.download_url).await?;

        if response.status() != StatusCode::OK {
            return Err(anyhow!("unexpected status {}", response.status()));
        }

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
            return Err(anyhow!("unexpected status {}", response.status()));
        }

        let tar_gz = response.bytes().await?;
        if tar_gz.len() > MAX_DOWNLOAD_SIZE {
            return Err(anyhow!("download of {} bytes exceeds limit", tar_gz.len()));
        }

        self.build_deb(&tar_gz)
    }
}
