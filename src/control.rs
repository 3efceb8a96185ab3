use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::orchestrator::{Orchestrator, RunReport, DEFAULT_EMAIL_TARGET};

fn default_email_target() -> u32 {
    DEFAULT_EMAIL_TARGET
}

/// Inbound popup messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Start {
        #[serde(rename = "emailTarget", default = "default_email_target")]
        email_target: u32,
    },
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    Started,
    Stopped,
}

/// Outbound messages to the popup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Progress {
        page: usize,
        total: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
    Complete {
        total: usize,
    },
}

/// Owns the orchestrator for the lifetime of a page context and turns
/// control messages into runs. At most one run is active at a time.
pub struct Controller {
    orchestrator: Arc<tokio::sync::Mutex<Orchestrator>>,
    events: UnboundedSender<ProgressEvent>,
    running: Arc<AtomicBool>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<RunReport>>>,
}

impl Controller {
    pub fn new(orchestrator: Orchestrator, events: UnboundedSender<ProgressEvent>) -> Self {
        Self {
            orchestrator: Arc::new(tokio::sync::Mutex::new(orchestrator)),
            events,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    /// Acknowledges immediately; the run itself proceeds in the background.
    pub fn handle(&self, message: ControlMessage) -> Ack {
        match message {
            ControlMessage::Start { email_target } => {
                self.start(email_target);
                Ack::Started
            }
            ControlMessage::Stop => {
                self.stop();
                Ack::Stopped
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns false when a run is already in progress; the request is dropped.
    pub fn start(&self, email_target: u32) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Extraction already running, ignoring start");
            return false;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

        let orchestrator = Arc::clone(&self.orchestrator);
        let events = self.events.clone();
        let running = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            let report = orchestrator.lock().await.run(email_target, &cancel, &events).await;
            running.store(false, Ordering::SeqCst);
            report
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// Cooperative: the step in flight finishes before the run notices.
    pub fn stop(&self) {
        info!("Stop requested");
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).cancel();
    }

    /// Wait for the current run, if any, and hand back its report.
    pub async fn wait_idle(&self) -> Option<RunReport> {
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        match handle.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Extraction task failed: {}", e);
                self.running.store(false, Ordering::SeqCst);
                None
            }
        }
    }
}
