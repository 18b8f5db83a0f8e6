//! Fan-in channel that carries engine events to a single async callback.
//!
//! Each [`EventHandler`] owns the receiving half of a bounded queue and hands out [`EventProducer`]s. Every event that
//! arrives is dispatched to its own task, so a slow notification never holds up the order flow that published it.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    inbox: mpsc::Receiver<E>,
    outbox: mpsc::Sender<E>,
    callback: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, callback: Handler<E>) -> Self {
        let (outbox, inbox) = mpsc::channel(buffer_size);
        Self { inbox, outbox, callback }
    }

    /// A new publishing handle. The handler stays alive for as long as any of these exist.
    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.outbox.clone())
    }

    /// Runs until every producer has been dropped and all in-flight handler jobs have finished.
    pub async fn start_handler(mut self) {
        debug!("📬️ Event handler listening");
        // Only subscribers may keep the channel open
        drop(self.outbox);
        let mut in_flight = JoinSet::new();
        while let Some(event) = self.inbox.recv().await {
            let callback = Arc::clone(&self.callback);
            in_flight.spawn(async move { callback(event).await });
            // Reap finished jobs so the set does not grow without bound
            while let Some(done) = in_flight.try_join_next() {
                report_job(done);
            }
        }
        debug!("📬️ Producers closed. {} event jobs still running", in_flight.len());
        while let Some(done) = in_flight.join_next().await {
            report_job(done);
        }
        debug!("📬️ Event handler stopped");
    }
}

fn report_job(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!("📬️ Event job panicked or was cancelled: {e}");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("📬️ Event dropped. The handler for this channel has already stopped.");
        }
    }
}
