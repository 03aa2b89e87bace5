//! Background event queue
//!
//! Callers that don't want to wait for delivery hand events to the queue; a
//! worker drains it and routes each event on its own task. At most
//! `max_in_flight` events are routed at once, so a slow provider backs up into
//! the bounded queue and `submit` starts reporting full.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::router::EventRouter;
use crate::events::IncomingEvent;

/// Default number of events buffered before the queue reports full
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of events routed concurrently
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("event queue is full")]
    Full,

    #[error("event queue is closed")]
    Closed,
}

/// Sending half of the event queue
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<IncomingEvent>,
}

impl EventQueue {
    /// Enqueue without waiting
    pub fn submit(&self, event: IncomingEvent) -> Result<(), QueueError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

/// Worker draining the queue into the router
pub struct RouterWorker {
    router: Arc<EventRouter>,
    rx: mpsc::Receiver<IncomingEvent>,
    max_in_flight: usize,
}

impl RouterWorker {
    pub fn new(router: Arc<EventRouter>, capacity: usize, max_in_flight: usize) -> (EventQueue, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Self {
            router,
            rx,
            max_in_flight: max_in_flight.max(1),
        };
        (EventQueue { tx }, worker)
    }

    /// Start the background worker.
    ///
    /// It stops once every queue handle is dropped, and only after every
    /// buffered event has been routed and every routing pass has finished.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(max_in_flight = self.max_in_flight, "Router worker started");

            let permits = Arc::new(Semaphore::new(self.max_in_flight));
            let mut passes = JoinSet::new();

            loop {
                // Take a slot before taking an event, so a saturated worker
                // leaves events in the queue
                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let Some(event) = self.rx.recv().await else {
                    break;
                };

                // Reap passes that already finished
                while let Some(Some(result)) = passes.join_next().now_or_never() {
                    log_pass_result(result);
                }

                let router = Arc::clone(&self.router);
                passes.spawn(async move {
                    router.route(&event).await;
                    drop(permit);
                });
            }

            let pending = passes.len();
            if pending > 0 {
                tracing::info!(pending, "Waiting for in-flight events");
            }
            while let Some(result) = passes.join_next().await {
                log_pass_result(result);
            }

            tracing::info!("Router worker stopped");
        })
    }
}

fn log_pass_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Routing task failed");
    }
}
