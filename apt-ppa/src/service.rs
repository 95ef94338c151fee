// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository orchestration.

[Ppa] owns the full publication pipeline: one polling worker per
registered source performs change detection against persisted state,
ingests new `.deb` artifacts into the pool, and regenerates the signed
repository-wide metadata under an exclusive lock. It also hosts the
read-path HTTP server and the admin delete operation.
*/

use {
    crate::{
        deb::parse_deb_control,
        error::{PpaError, Result},
        index::{assemble_packages, gzip, render_package_stanza, FileHash},
        server::{self, ServerState},
        signer::GpgSigner,
        source::{SourceInfo, SourceRegistration},
        store::ObjectStore,
    },
    chrono::Utc,
    once_cell::sync::Lazy,
    regex::Regex,
    std::{future::IntoFuture, sync::Arc, time::Duration},
    tokio::{net::TcpListener, task::JoinSet, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

/// Maximum accepted `.deb` size.
const MAX_DEB_SIZE: usize = 512 * 1024 * 1024;

/// Drain window granted to the HTTP server on shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Content type stored on pool objects.
const DEB_CONTENT_TYPE: &str = "application/vnd.debian.binary-package";

/// Allowed shape for `Package` and `Version` values.
///
/// These values are interpolated into object keys and served back to
/// clients, so anything that could escape the pool layout is rejected.
static SAFE_DEB_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9.+~:\-]*$").expect("field regex is valid"));

/// Repository identity and listen configuration.
#[derive(Clone, Debug)]
pub struct RepoConfig {
    /// Value of the `Origin` field in `Release`, also the hostname shown
    /// in setup instructions.
    pub origin: String,
    /// Value of the `Label` field in `Release`.
    pub label: String,
    /// Read-path listen address. A bare `:port` binds all interfaces.
    pub listen_addr: String,
}

/// The repository service.
pub struct Ppa {
    config: RepoConfig,
    store: Arc<dyn ObjectStore>,
    signer: GpgSigner,
    /// Serializes repository metadata regeneration across all sources.
    regen_lock: tokio::sync::Mutex<()>,
    sources: Vec<SourceRegistration>,
}

impl Ppa {
    /// Construct a service over a store and signer.
    pub fn new(config: RepoConfig, store: Arc<dyn ObjectStore>, signer: GpgSigner) -> Self {
        Self {
            config,
            store,
            signer,
            regen_lock: tokio::sync::Mutex::new(()),
            sources: vec![],
        }
    }

    /// Register a source. Must happen before [Self::run].
    pub fn register(&mut self, registration: SourceRegistration) {
        self.sources.push(registration);
    }

    /// Run the service until the token is cancelled.
    ///
    /// Starts one polling worker per registered source plus the read-path
    /// HTTP server. On cancellation the server is drained with a bounded
    /// budget, and `run` returns once every worker has finished.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let sources = self
            .sources
            .iter()
            .map(|reg| SourceInfo::for_source(reg.source.as_ref()))
            .collect::<Vec<_>>();

        let state = ServerState::new(
            self.store.clone(),
            self.signer.public_key().to_vec(),
            sources,
            &self.config.origin,
        );
        let app = server::router(state);

        let addr = normalize_listen_addr(&self.config.listen_addr);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "listening");

        let mut workers = JoinSet::new();
        for registration in self.sources.clone() {
            let ppa = self.clone();
            let cancel = cancel.clone();
            workers.spawn(async move { ppa.run_poller(registration, cancel).await });
        }

        let shutdown = {
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        };
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .into_future();
        tokio::pin!(serve);

        let drain_expired = async {
            cancel.cancelled().await;
            tokio::time::sleep(SHUTDOWN_DRAIN).await;
        };

        tokio::select! {
            res = &mut serve => res?,
            _ = drain_expired => warn!("HTTP server drain window expired, abandoning"),
        }

        while workers.join_next().await.is_some() {}
        info!("shutdown complete");

        Ok(())
    }

    async fn run_poller(&self, registration: SourceRegistration, cancel: CancellationToken) {
        let name = registration.source.name().to_string();
        info!(
            source = %name,
            interval_secs = registration.poll_interval.as_secs(),
            "starting poller"
        );

        // The first tick fires immediately, giving the startup poll cycle.
        let mut ticker = tokio::time::interval(registration.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.poll(&registration, &cancel).await,
            }
        }
    }

    /// Perform one poll cycle for a source.
    ///
    /// Transient failures are logged and swallowed; the persisted state is
    /// only advanced after a fully successful ingest, so the next cycle
    /// retries automatically.
    pub async fn poll(&self, registration: &SourceRegistration, cancel: &CancellationToken) {
        let name = registration.source.name();
        debug!(source = name, "polling for new version");

        let state = match registration.source.check(cancel).await {
            Ok(state) => state,
            Err(err) => {
                error!(source = name, error = %err, "check failed");
                return;
            }
        };

        if let Ok(last_state) = self.store.get(&format!("meta/{}/state", name)).await {
            if last_state == state.as_bytes() && !state.is_empty() {
                debug!(source = name, "no new version detected");
                return;
            }
        }

        info!(source = name, "new version detected, fetching");

        let deb = match registration.source.fetch(cancel).await {
            Ok(deb) => deb,
            Err(err) => {
                error!(source = name, error = %err, "fetch failed");
                return;
            }
        };

        if let Err(err) = self.ingest(name, &state, deb).await {
            error!(source = name, error = %err, "error processing new version");
        }
    }

    /// Ingest a fetched `.deb` for a source.
    async fn ingest(&self, source_name: &str, state: &str, deb: Vec<u8>) -> Result<()> {
        if deb.len() > MAX_DEB_SIZE {
            return Err(PpaError::OversizeInput(deb.len()));
        }

        let control = parse_deb_control(std::io::Cursor::new(&deb))
            .map_err(|e| PpaError::InvalidPackage(e.to_string()))?;

        let package = control.package()?.to_string();
        let version = control.version()?.to_string();

        if !SAFE_DEB_FIELD.is_match(&package) {
            return Err(PpaError::UnsafeName(package));
        }
        if !SAFE_DEB_FIELD.is_match(&version) {
            return Err(PpaError::UnsafeName(version));
        }

        // The regex guarantees an ASCII first character.
        let filename = format!(
            "pool/{}/{}/{}-{}.deb",
            &package[..1],
            package,
            package,
            version
        );

        let size = deb.len() as u64;
        let digest = crate::io::MultiDigester::digest(&deb);

        info!(
            source = source_name,
            file = %filename,
            bytes = size,
            "uploading package"
        );
        self.store
            .put(&filename, deb, Some(DEB_CONTENT_TYPE))
            .await?;

        let stanza = render_package_stanza(control.paragraph(), &filename, size, &digest)?;
        self.store
            .put(
                &format!("meta/{}/packages-entry", source_name),
                stanza,
                Some("text/plain"),
            )
            .await?;

        // The state write shares the critical section with regeneration so
        // published metadata never races state persistence for a source.
        let _guard = self.regen_lock.lock().await;

        self.regenerate().await?;

        if !state.is_empty() {
            self.store
                .put(
                    &format!("meta/{}/state", source_name),
                    state.as_bytes().to_vec(),
                    Some("text/plain"),
                )
                .await?;
        }

        info!(
            source = source_name,
            package = %package,
            version = %version,
            "successfully processed"
        );

        Ok(())
    }

    /// Recompose and republish the repository-wide metadata.
    ///
    /// Callers must hold the regeneration lock.
    async fn regenerate(&self) -> Result<()> {
        let keys = self.store.list_prefix("meta/").await?;

        let mut fragments = Vec::new();
        for key in keys.iter().filter(|k| k.ends_with("/packages-entry")) {
            match self.store.get(key).await {
                Ok(data) if !data.is_empty() => fragments.push(data),
                Ok(_) => {}
                Err(err) => {
                    warn!(key = %key, error = %err, "failed to download packages entry");
                }
            }
        }

        let packages = assemble_packages(fragments);
        let packages_gz = gzip(&packages)?;

        let files = vec![
            FileHash::compute("main/binary-amd64/Packages", &packages),
            FileHash::compute("main/binary-amd64/Packages.gz", &packages_gz),
        ];

        let release = crate::index::render_release(
            &self.config.origin,
            &self.config.label,
            Utc::now(),
            &files,
        );

        let in_release = self.signer.clearsign(&release)?;
        let release_gpg = self.signer.detached_sign(&release)?;

        let uploads = [
            ("dists/stable/main/binary-amd64/Packages", packages),
            ("dists/stable/main/binary-amd64/Packages.gz", packages_gz),
            ("dists/stable/Release", release),
            ("dists/stable/InRelease", in_release),
            ("dists/stable/Release.gpg", release_gpg),
            ("key.gpg", self.signer.public_key().to_vec()),
        ];

        for (key, data) in uploads {
            self.store.put(key, data, None).await?;
        }

        Ok(())
    }

    /// Remove all pool files, metadata, and state for a source, then
    /// regenerate the repository metadata without it.
    pub async fn delete_source(&self, source_name: &str) -> Result<()> {
        info!(source = source_name, "deleting source");

        if let Ok(entry) = self
            .store
            .get(&format!("meta/{}/packages-entry", source_name))
            .await
        {
            for line in String::from_utf8_lossy(&entry).lines() {
                if let Some(filename) = line.strip_prefix("Filename: ") {
                    info!(source = source_name, file = filename, "deleting file");
                    if let Err(err) = self.store.delete(filename).await {
                        warn!(source = source_name, file = filename, error = %err, "failed to delete file");
                    }
                }
            }
        }

        for key in [
            format!("meta/{}/packages-entry", source_name),
            format!("meta/{}/state", source_name),
        ] {
            info!(source = source_name, key = %key, "deleting meta");
            if let Err(err) = self.store.delete(&key).await {
                warn!(source = source_name, key = %key, error = %err, "failed to delete meta");
            }
        }

        let _guard = self.regen_lock.lock().await;
        self.regenerate().await?;

        info!(source = source_name, "source deleted successfully");

        Ok(())
    }
}

/// Expand a Go-style `:port` listen address to bind all interfaces.
fn normalize_listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{}", port)
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_field_accepts_typical_values() {
        for value in ["discord", "zcli", "1.2.3", "1:2.0+git~beta-1", "a"] {
            assert!(SAFE_DEB_FIELD.is_match(value), "{} should match", value);
        }
    }

    #[test]
    fn safe_field_rejects_escapes() {
        for value in ["", "../etc", ".hidden", "a/b", "a b", "-lead", "name\n"] {
            assert!(!SAFE_DEB_FIELD.is_match(value), "{} should not match", value);
        }
    }

    #[test]
    fn listen_addr_normalization() {
        assert_eq!(normalize_listen_addr(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_listen_addr("127.0.0.1:9000"), "127.0.0.1:9000");
    }
}
