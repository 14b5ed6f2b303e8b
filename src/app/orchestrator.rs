//! Wires adapters into a [`Desk`] and runs it.

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::info;

use super::config::{Config, DatabaseBackend, GatewayKind};
use crate::adapter::memory::MemoryRepository;
use crate::adapter::notifier::NotifierRegistry;
use crate::adapter::paper::PaperGateway;
use crate::adapter::sqlite;
use crate::application::Desk;
use crate::error::Result;
use crate::port::{AccountGateway, NoopTrackerApi, Repository, TrackerApi};

/// A configured desk plus the adapter tasks feeding it.
pub struct App {
    desk: Arc<Desk>,
    pumps: Vec<JoinHandle<()>>,
}

impl App {
    /// Build the repository, gateway and tracker adapters named by `config`.
    ///
    /// # Errors
    /// Fails if the database cannot be opened, a required token is missing,
    /// or the gateway client cannot be built.
    pub async fn build(config: &Config) -> Result<Self> {
        let repo = open_repository(config)?;
        let settings = config.desk_settings();
        let notifier = NotifierRegistry::with_logging();

        match config.gateway.kind {
            GatewayKind::Paper => {
                info!(balance = %config.gateway.paper_balance, "Using paper gateway");
                let gateway: Arc<dyn AccountGateway> =
                    Arc::new(PaperGateway::auto_open(config.gateway.paper_balance));
                let trackers: Arc<dyn TrackerApi> = Arc::new(NoopTrackerApi);
                let desk = Desk::new(repo, gateway, trackers, notifier, settings);
                Ok(Self {
                    desk,
                    pumps: Vec::new(),
                })
            }
            GatewayKind::Metaapi => Self::build_metaapi(config, repo, notifier, settings).await,
        }
    }

    #[cfg(feature = "metaapi")]
    async fn build_metaapi(
        config: &Config,
        repo: Arc<dyn Repository>,
        notifier: NotifierRegistry,
        settings: crate::application::DeskSettings,
    ) -> Result<Self> {
        use crate::adapter::metaapi::{MetaApiClient, MetaApiGateway, MetaApiTrackerApi};

        let token = config.require_token()?;
        let metaapi = config.metaapi_settings(token);
        info!(region = %metaapi.region, "Using MetaApi gateway");

        let gateway: Arc<dyn AccountGateway> = Arc::new(MetaApiGateway::new(metaapi.clone())?);
        let trackers = Arc::new(MetaApiTrackerApi::new(MetaApiClient::new(&metaapi)?));
        let tracker_port: Arc<dyn TrackerApi> = Arc::clone(&trackers) as Arc<dyn TrackerApi>;
        let desk = Desk::new(repo, gateway, tracker_port, notifier, settings);

        let idle = std::time::Duration::from_secs(config.gateway.tracker_poll_secs);
        let pump = trackers.spawn_event_pump(desk.event_sink(), idle);
        Ok(Self {
            desk,
            pumps: vec![pump],
        })
    }

    #[cfg(not(feature = "metaapi"))]
    async fn build_metaapi(
        _config: &Config,
        _repo: Arc<dyn Repository>,
        _notifier: NotifierRegistry,
        _settings: crate::application::DeskSettings,
    ) -> Result<Self> {
        Err(crate::error::ConfigError::InvalidValue {
            field: "gateway.kind",
            reason: "built without the metaapi feature".into(),
        }
        .into())
    }

    #[must_use]
    pub fn desk(&self) -> &Arc<Desk> {
        &self.desk
    }

    /// Load groups, participants and freezes once without starting loops.
    pub async fn prepare(&self) -> Result<()> {
        self.desk.refresh_structural().await?;
        Ok(())
    }

    /// Run until Ctrl+C.
    pub async fn run(config: Config) -> Result<()> {
        let app = Self::build(&config).await?;
        app.run_until(async {
            if signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received (Ctrl+C)");
            }
        })
        .await
    }

    /// Start the desk and run until `shutdown` completes.
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        let handle = self.desk.start().await?;
        shutdown.await;
        handle.shutdown().await;
        self.close();
        Ok(())
    }

    /// Stop adapter tasks and cancel pending timers.
    pub fn close(self) {
        for pump in self.pumps {
            pump.abort();
        }
        self.desk.engine().shutdown();
    }
}

fn open_repository(config: &Config) -> Result<Arc<dyn Repository>> {
    match config.database.backend {
        DatabaseBackend::Memory => {
            info!("Using in-memory repository");
            Ok(Arc::new(MemoryRepository::new()))
        }
        DatabaseBackend::Sqlite => {
            info!(url = %config.database.url, "Opening SQLite repository");
            Ok(Arc::new(sqlite::open(&config.database.url)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paper_app_runs_and_stops() {
        let config = Config::parse_toml(
            "[gateway]\nkind = \"paper\"\n[database]\nbackend = \"memory\"",
        )
        .unwrap();
        let app = App::build(&config).await.unwrap();
        app.prepare().await.unwrap();
        assert!(app.desk().cache().groups().is_empty());
        app.run_until(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn metaapi_without_token_fails_to_build() {
        let config = Config::parse_toml("[database]\nbackend = \"memory\"").unwrap();
        assert!(App::build(&config).await.is_err());
    }
}
