// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! APT repository server entry point.

Runs the polling workers and the read-path HTTP server until interrupted,
or executes the `delete` admin flow when invoked as a subcommand.
*/

mod config;
mod sources;

use {
    anyhow::Context,
    apt_ppa::{
        fetch,
        service::{Ppa, RepoConfig},
        signer::GpgSigner,
        source::SourceRegistration,
        store::{ObjectStore, S3Store},
    },
    clap::{error::ErrorKind, Parser, Subcommand},
    sources::{DiscordSource, PostmanSource, ZcliSource},
    std::sync::Arc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info},
    tracing_subscriber::EnvFilter,
};

#[derive(Debug, Parser)]
#[command(
    name = "apt-ppa-server",
    about = "Self-updating APT repository with pluggable upstream package sources"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Delete sources: remove their pool objects and state, then
    /// regenerate the repository metadata.
    Delete {
        /// Source names to delete.
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn init_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_ascii_lowercase()))
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                let _ = err.print();
                std::process::exit(0);
            }
            eprintln!("{}", err.render());
            std::process::exit(1);
        }
    };

    std::process::exit(match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            // Configuration errors can precede logging setup, so report
            // fatal errors on stderr directly.
            eprintln!("Error: {:#}", err);
            1
        }
    });
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_logging(&cfg.log_level);

    if !cfg.env_file_loaded {
        debug!("no .env file found, using process environment");
    }

    let store: Arc<dyn ObjectStore> =
        Arc::new(S3Store::new(cfg.s3.clone()).context("initializing object store")?);
    let signer = GpgSigner::new(&cfg.gpg_private_key).context("initializing signer")?;

    let mut ppa = Ppa::new(
        RepoConfig {
            origin: cfg.origin.clone(),
            label: cfg.label.clone(),
            listen_addr: cfg.listen_addr.clone(),
        },
        store,
        signer,
    );

    if let Some(Command::Delete { names }) = cli.command {
        for name in names {
            ppa.delete_source(&name)
                .await
                .with_context(|| format!("deleting source {}", name))?;
        }
        return Ok(());
    }

    let client = fetch::build_http_client().context("building HTTP client")?;

    if !cfg.discord.poll_interval.is_zero() {
        ppa.register(SourceRegistration {
            source: Arc::new(DiscordSource::new(
                &cfg.discord.download_url,
                client.clone(),
            )),
            poll_interval: cfg.discord.poll_interval,
        });
    }

    if !cfg.postman.poll_interval.is_zero() {
        ppa.register(SourceRegistration {
            source: Arc::new(PostmanSource::new(
                &cfg.postman.download_url,
                &cfg.maintainer,
                client.clone(),
            )),
            poll_interval: cfg.postman.poll_interval,
        });
    }

    if !cfg.zcli.github_repo.is_empty() && !cfg.zcli.poll_interval.is_zero() {
        ppa.register(SourceRegistration {
            source: Arc::new(ZcliSource::new(&cfg.zcli.github_repo, client.clone())),
            poll_interval: cfg.zcli.poll_interval,
        });
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    Arc::new(ppa).run(cancel).await?;

    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    error!(error = %err, "installing SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupt received, shutting down"),
            _ = terminate => info!("termination signal received, shutting down"),
        }

        cancel.cancel();
    });
}
