use super::messages::{BackendCommand, BackendEvent};
use crate::database::{database_url, CatalogStore};
use crate::downloader::{DownloadOrchestrator, StartOutcome};
use crate::extractor::{ExtractionBackend, YtDlpBackend};
use crate::utils::config::AppSettings;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct BackendActor {
    receiver: mpsc::Receiver<BackendCommand>,
    sender: mpsc::Sender<BackendEvent>,

    // Components
    orchestrator: Arc<DownloadOrchestrator>,
    catalog: CatalogStore,
}

impl BackendActor {
    /// Build the yt-dlp backend and open the catalog named in `settings`.
    pub async fn new(
        settings: AppSettings,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Result<Self> {
        let db_url = database_url(&settings.database_path);
        let catalog = CatalogStore::open(&db_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open catalog {}: {}", db_url, e))?;

        let backend: Arc<dyn ExtractionBackend> =
            Arc::new(YtDlpBackend::new(settings.ytdlp_path.clone()));
        let orchestrator = Arc::new(DownloadOrchestrator::new(backend, catalog.clone(), settings));

        Ok(Self::with_components(orchestrator, catalog, receiver, sender))
    }

    /// Assemble an actor around existing components.
    pub fn with_components(
        orchestrator: Arc<DownloadOrchestrator>,
        catalog: CatalogStore,
        receiver: mpsc::Receiver<BackendCommand>,
        sender: mpsc::Sender<BackendEvent>,
    ) -> Self {
        Self {
            receiver,
            sender,
            orchestrator,
            catalog,
        }
    }

    pub fn orchestrator(&self) -> Arc<DownloadOrchestrator> {
        self.orchestrator.clone()
    }

    pub async fn run(mut self) {
        info!("BackendActor started");

        // Forward published state as events
        let forwarders = [
            Self::forward(self.orchestrator.subscribe(), self.sender.clone(), BackendEvent::Snapshot),
            Self::forward(self.catalog.subscribe(), self.sender.clone(), BackendEvent::CatalogChanged),
        ];

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                BackendCommand::StartDownload { url } => {
                    self.handle_start_download(url);
                }
                BackendCommand::StopDownload => {
                    let outcome = self.orchestrator.stop_download().await;
                    let _ = self.sender.send(BackendEvent::StopResult(outcome)).await;
                }
                BackendCommand::DeleteEntry(id) => {
                    self.handle_delete(id).await;
                }
                BackendCommand::Shutdown => {
                    info!("BackendActor shutting down");
                    break;
                }
            }
        }

        for handle in forwarders {
            handle.abort();
        }
    }

    /// Run the download on its own task so stop requests keep flowing.
    fn handle_start_download(&self, url: String) {
        let orchestrator = self.orchestrator.clone();
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let permissions = orchestrator.probe_permissions();
            let event = match orchestrator.start_download(&url, permissions).await {
                Ok(StartOutcome::Busy) => BackendEvent::DownloadIgnored { url },
                Ok(StartOutcome::Finished(outcome)) => BackendEvent::DownloadFinished(Ok(outcome)),
                Err(e) => {
                    warn!("Download of {} ended without a result: {}", url, e);
                    BackendEvent::DownloadFinished(Err(e))
                }
            };
            let _ = sender.send(event).await;
        });
    }

    async fn handle_delete(&self, id: i64) {
        let entry = match self.catalog.get(id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                let _ = self
                    .sender
                    .send(BackendEvent::Deleted { id, removed: false })
                    .await;
                return;
            }
            Err(e) => {
                error!("Failed to look up catalog entry {}: {}", id, e);
                let _ = self.sender.send(BackendEvent::Error(e.to_string())).await;
                return;
            }
        };

        let event = match self.catalog.delete_with_file(&entry).await {
            Ok(removed) => BackendEvent::Deleted { id, removed },
            Err(e) => {
                error!("Failed to delete catalog entry {}: {}", id, e);
                BackendEvent::Error(e.to_string())
            }
        };
        let _ = self.sender.send(event).await;
    }

    fn forward<T, F>(
        mut rx: watch::Receiver<T>,
        sender: mpsc::Sender<BackendEvent>,
        wrap: F,
    ) -> JoinHandle<()>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T) -> BackendEvent + Send + 'static,
    {
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                if sender.send(wrap(value)).await.is_err() {
                    break;
                }
            }
        })
    }
}
