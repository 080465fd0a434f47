//! BackendActor command/event flow over a scripted extraction backend.

mod common;

use clipkeep::backend::{BackendActor, BackendCommand, BackendEvent};
use clipkeep::database::{CatalogStore, MEMORY_DB};
use clipkeep::downloader::{DownloadOrchestrator, StopOutcome};
use clipkeep::utils::{AppSettings, DownloadError};
use common::{tool_output, ScriptedBackend, Step};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    commands: mpsc::Sender<BackendCommand>,
    events: mpsc::Receiver<BackendEvent>,
    backend: Arc<ScriptedBackend>,
    catalog: CatalogStore,
    actor: JoinHandle<()>,
    dir: TempDir,
}

async fn start(steps: Vec<Step>, dir: TempDir) -> Harness {
    let settings = AppSettings {
        download_location: dir.path().join("videos"),
        ..Default::default()
    };
    let catalog = CatalogStore::open(MEMORY_DB).await.expect("catalog");
    let backend = Arc::new(ScriptedBackend::new(steps));
    let orchestrator = Arc::new(
        DownloadOrchestrator::new(backend.clone(), catalog.clone(), settings)
            .with_strategies(vec!["best".to_string(), "mp4/best".to_string()]),
    );

    let (commands, cmd_rx) = mpsc::channel(16);
    let (event_tx, events) = mpsc::channel(256);
    let actor = BackendActor::with_components(orchestrator, catalog.clone(), cmd_rx, event_tx);
    let actor = tokio::spawn(actor.run());

    Harness {
        commands,
        events,
        backend,
        catalog,
        actor,
        dir,
    }
}

/// Next event accepted by `pick`, skipping the rest.
async fn wait_for<T>(
    events: &mut mpsc::Receiver<BackendEvent>,
    mut pick: impl FnMut(BackendEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("actor alive");
            if let Some(value) = pick(event) {
                return value;
            }
        }
    })
    .await
    .expect("event within timeout")
}

#[tokio::test]
async fn download_then_delete_through_the_actor() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("Clip.mp4");
    std::fs::write(&file, b"video").unwrap();
    let mut h = start(
        vec![Step::Exit(1), Step::Succeed(tool_output("Clip", &file))],
        dir,
    )
    .await;

    h.commands
        .send(BackendCommand::StartDownload {
            url: "https://youtu.be/abc".to_string(),
        })
        .await
        .unwrap();

    let outcome = wait_for(&mut h.events, |e| match e {
        BackendEvent::DownloadFinished(result) => Some(result),
        _ => None,
    })
    .await
    .expect("download succeeds");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(h.backend.calls(), 2);
    assert!(h.dir.path().join("videos").is_dir());

    let id = outcome.catalog_id.expect("catalog id");
    h.commands.send(BackendCommand::DeleteEntry(id)).await.unwrap();
    let removed = wait_for(&mut h.events, |e| match e {
        BackendEvent::Deleted { id: deleted, removed } if deleted == id => Some(removed),
        _ => None,
    })
    .await;
    assert!(removed);
    assert!(!file.exists());
    assert_eq!(h.catalog.count().await.unwrap(), 0);

    let entries = wait_for(&mut h.events, |e| match e {
        BackendEvent::CatalogChanged(entries) if entries.is_empty() => Some(entries),
        _ => None,
    })
    .await;
    assert!(entries.is_empty());

    h.commands.send(BackendCommand::Shutdown).await.unwrap();
    h.actor.await.unwrap();
}

#[tokio::test]
async fn invalid_url_is_reported_as_finished_with_error() {
    let mut h = start(vec![], TempDir::new().unwrap()).await;

    h.commands
        .send(BackendCommand::StartDownload {
            url: "not a url".to_string(),
        })
        .await
        .unwrap();

    let result = wait_for(&mut h.events, |e| match e {
        BackendEvent::DownloadFinished(result) => Some(result),
        _ => None,
    })
    .await;
    assert!(matches!(result, Err(DownloadError::InvalidUrl(_))));
    assert_eq!(h.backend.inits(), 0);
}

#[tokio::test]
async fn second_start_while_busy_is_ignored() {
    let mut h = start(vec![Step::Block(String::new())], TempDir::new().unwrap()).await;

    h.commands
        .send(BackendCommand::StartDownload {
            url: "https://youtu.be/first".to_string(),
        })
        .await
        .unwrap();
    h.backend.started.notified().await;

    h.commands
        .send(BackendCommand::StartDownload {
            url: "https://youtu.be/second".to_string(),
        })
        .await
        .unwrap();
    let ignored = wait_for(&mut h.events, |e| match e {
        BackendEvent::DownloadIgnored { url } => Some(url),
        _ => None,
    })
    .await;
    assert_eq!(ignored, "https://youtu.be/second");

    h.commands.send(BackendCommand::StopDownload).await.unwrap();
    let stop = wait_for(&mut h.events, |e| match e {
        BackendEvent::StopResult(outcome) => Some(outcome),
        _ => None,
    })
    .await;
    assert_eq!(stop, StopOutcome::Stopped);

    let result = wait_for(&mut h.events, |e| match e {
        BackendEvent::DownloadFinished(result) => Some(result),
        _ => None,
    })
    .await;
    assert_eq!(result, Err(DownloadError::Cancelled));
    assert_eq!(h.backend.calls(), 1);
}

#[tokio::test]
async fn stop_and_delete_without_targets() {
    let mut h = start(vec![], TempDir::new().unwrap()).await;

    h.commands.send(BackendCommand::StopDownload).await.unwrap();
    let stop = wait_for(&mut h.events, |e| match e {
        BackendEvent::StopResult(outcome) => Some(outcome),
        _ => None,
    })
    .await;
    assert_eq!(stop, StopOutcome::NoActiveDownload);

    h.commands.send(BackendCommand::DeleteEntry(99)).await.unwrap();
    let removed = wait_for(&mut h.events, |e| match e {
        BackendEvent::Deleted { id: 99, removed } => Some(removed),
        _ => None,
    })
    .await;
    assert!(!removed);

    h.commands.send(BackendCommand::Shutdown).await.unwrap();
    h.actor.await.unwrap();
}
