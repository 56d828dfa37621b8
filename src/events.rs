//! A minimal domain event bus. Handlers and background tasks publish
//! lifecycle events here; a single consumer logs them. This is observability
//! plumbing, not a delivery guarantee — events are best-effort and never
//! block the operation that raised them for longer than the channel send.

use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum Event {
    ProjectQueued { project_id: String },
    ProjectProcessingStarted { project_id: String },
    ProjectFinished { project_id: String },
    ProjectErrored { project_id: String, reason: String },
    ProjectCancelled { project_id: String },
    BomItemMatched { bom_item_id: i32, match_status: String },
}

#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("event channel closed: {e}"))
    }
}

/// Drains the event channel for the lifetime of the process, logging each
/// event. Spawned once from `main`.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::ProjectErrored { project_id, reason } => {
                warn!(project_id, reason, "project errored");
            }
            _ => info!(?event, "domain event"),
        }
    }
}
