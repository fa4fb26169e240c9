use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cache::Resolved;
use crate::error::WorkerError;
use crate::net::Request;

use super::lifecycle::{ActivateReport, InstallReport};
use super::Worker;

/// Events delivered by the host
#[derive(Debug)]
pub enum WorkerEvent {
  /// A new version is being installed
  Install,
  /// The installed version takes over
  Activate,
  /// An intercepted request awaiting a response
  Fetch(Request),
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Responded(Resolved),
}

struct Envelope {
  event: WorkerEvent,
  reply: oneshot::Sender<Result<EventOutcome, WorkerError>>,
}

/// Handle for delivering events to a running worker loop
#[derive(Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSender {
  /// Deliver an event and wait until the worker has finished handling it.
  pub async fn send(&self, event: WorkerEvent) -> Result<EventOutcome, WorkerError> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(Envelope { event, reply })
      .map_err(|_| WorkerError::Stopped)?;
    rx.await.map_err(|_| WorkerError::Stopped)?
  }
}

/// Start the event loop for a worker.
///
/// Lifecycle events run one at a time in arrival order. Each fetch event runs
/// in its own task, so slow requests do not hold up later ones. The loop ends
/// once every sender is dropped.
pub fn spawn(worker: Arc<Worker>) -> EventSender {
  let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

  tokio::spawn(async move {
    while let Some(Envelope { event, reply }) = rx.recv().await {
      match event {
        WorkerEvent::Fetch(_) => {
          let worker = Arc::clone(&worker);
          tokio::spawn(async move {
            let outcome = worker.dispatch(event).await;
            // Receiver gone means the caller stopped waiting
            let _ = reply.send(outcome);
          });
        }
        _ => {
          let outcome = worker.dispatch(event).await;
          let _ = reply.send(outcome);
        }
      }
    }
    debug!("event loop stopped");
  });

  EventSender { tx }
}
