//! Scripted extraction backend shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clipkeep::extractor::{ExtractionBackend, ExtractionRequest, ExtractionResponse, ProgressCallback};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// What one `execute` call does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Exit 0 with this stdout
    Succeed(String),
    /// Exit with this non-zero code
    Exit(i32),
    /// The run could not be performed
    Error(String),
    /// Report half progress, then wait until released (then succeed with
    /// the stdout) or destroyed
    Block(String),
}

pub const HALF_WAY_LINE: &str = "[download]  50.0% of 1.00MiB ETA 00:03";

/// Counts an `execute` call as running until it returns or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    init_failures: AtomicUsize,
    inits: AtomicUsize,
    requests: Mutex<Vec<ExtractionRequest>>,
    running: Mutex<HashMap<String, oneshot::Sender<()>>>,
    destroyed: Mutex<Vec<String>>,
    ignore_destroy: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub started: Notify,
    pub release: Notify,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            init_failures: AtomicUsize::new(0),
            inits: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            running: Mutex::new(HashMap::new()),
            destroyed: Mutex::new(Vec::new()),
            ignore_destroy: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Fail the first `count` init calls.
    pub fn failing_init(self, count: usize) -> Self {
        self.init_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Record destroy requests but never act on them.
    pub fn ignoring_destroy(self) -> Self {
        self.ignore_destroy.store(true, Ordering::SeqCst);
        self
    }

    /// Most `execute` calls that were running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// `-f` value of every request, in call order
    pub fn formats(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.option("-f").unwrap_or_default().to_string())
            .collect()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

fn response(exit_code: i32, out: &str) -> ExtractionResponse {
    ExtractionResponse {
        exit_code,
        out: out.to_string(),
        err: if exit_code == 0 {
            String::new()
        } else {
            "ERROR: Requested format is not available".to_string()
        },
        elapsed: Duration::from_millis(5),
    }
}

#[async_trait]
impl ExtractionBackend for ScriptedBackend {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn init(&self) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        let remaining = self.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("yt-dlp not found"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        request: &ExtractionRequest,
        process_id: &str,
        progress: ProgressCallback,
    ) -> Result<ExtractionResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Exit(1));

        match step {
            Step::Succeed(out) => {
                progress(Some(50.0), Some(3), HALF_WAY_LINE);
                progress(Some(100.0), None, "[download] 100% of 1.00MiB");
                Ok(response(0, &out))
            }
            Step::Exit(code) => Ok(response(code, "")),
            Step::Error(message) => Err(anyhow!(message)),
            Step::Block(out) => {
                let (tx, rx) = oneshot::channel();
                self.running
                    .lock()
                    .unwrap()
                    .insert(process_id.to_string(), tx);
                progress(Some(50.0), Some(3), HALF_WAY_LINE);
                self.started.notify_one();

                tokio::select! {
                    _ = rx => Err(anyhow!("process {} destroyed", process_id)),
                    _ = self.release.notified() => {
                        self.running.lock().unwrap().remove(process_id);
                        Ok(response(0, &out))
                    }
                }
            }
        }
    }

    async fn destroy_process(&self, process_id: &str) -> bool {
        self.destroyed.lock().unwrap().push(process_id.to_string());
        if self.ignore_destroy.load(Ordering::SeqCst) {
            return false;
        }
        match self.running.lock().unwrap().remove(process_id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

/// yt-dlp style output naming `file` and carrying a metadata line.
pub fn tool_output(title: &str, file: &std::path::Path) -> String {
    format!(
        "[youtube] abc123: Downloading webpage\n\
         [download] Destination: {}\n\
         [download] 100% of 1.00MiB in 00:01\n\
         {{\"title\": \"{}\", \"duration\": 65.4}}\n",
        file.display(),
        title
    )
}
