//! Sequential speech delivery.
//!
//! Spoken units are queued without bound and consumed by a single worker
//! task, so units reach synthesis in exactly the order they were produced.
//! For each unit the worker announces `speaking` with the unit text, runs
//! the synthesizer on the blocking pool, and broadcasts each audio buffer as
//! soon as it is generated. [`SpeechQueue::join`] resolves once every queued
//! unit has been consumed.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::messages::{SpokenUnit, StateMessage};
use crate::error::{ElysiaError, Result};
use crate::observers::ObserverHub;
use crate::tts::SpeechSynthesizer;

/// Buffers in flight between the synthesizer thread and the worker.
const AUDIO_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug)]
enum QueueItem {
    Unit(SpokenUnit),
    Shutdown,
}

/// Handle for enqueuing units and waiting for them to be spoken.
#[derive(Debug, Clone)]
pub struct SpeechQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    outstanding: Arc<watch::Sender<usize>>,
}

impl SpeechQueue {
    /// Start the delivery worker.
    ///
    /// The worker stops after a [`shutdown`](Self::shutdown) sentinel, when
    /// `cancel` fires, or when every handle is dropped.
    pub fn spawn(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        observers: Arc<ObserverHub>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0usize);
        let outstanding = Arc::new(outstanding);
        let worker = tokio::spawn(run_worker(
            rx,
            synthesizer,
            observers,
            Arc::clone(&outstanding),
            cancel,
        ));
        (Self { tx, outstanding }, worker)
    }

    /// Queue a unit for speaking.
    ///
    /// # Errors
    ///
    /// Returns [`ElysiaError::Channel`] if the worker has stopped.
    pub fn enqueue(&self, unit: SpokenUnit) -> Result<()> {
        self.outstanding.send_modify(|n| *n += 1);
        if self.tx.send(QueueItem::Unit(unit)).is_err() {
            self.outstanding.send_modify(|n| *n = n.saturating_sub(1));
            return Err(ElysiaError::Channel("speech worker has stopped".into()));
        }
        Ok(())
    }

    /// Units queued or being spoken.
    pub fn pending(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until every queued unit has been consumed.
    ///
    /// Also returns if the worker stops.
    pub async fn join(&self) {
        let mut rx = self.outstanding.subscribe();
        // The sender lives in `self`, so this only fails if it is dropped mid-wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Ask the worker to stop after the units already queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(QueueItem::Shutdown);
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    observers: Arc<ObserverHub>,
    outstanding: Arc<watch::Sender<usize>>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => break,
            item = rx.recv() => item,
        };
        match item {
            Some(QueueItem::Unit(unit)) => {
                speak(&unit, &synthesizer, &observers, &cancel).await;
                outstanding.send_modify(|n| *n = n.saturating_sub(1));
            }
            Some(QueueItem::Shutdown) | None => break,
        }
    }
    // Nothing will consume what is left; release any joiners.
    outstanding.send_replace(0);
    debug!("speech worker stopped");
}

async fn speak(
    unit: &SpokenUnit,
    synthesizer: &Arc<dyn SpeechSynthesizer>,
    observers: &ObserverHub,
    cancel: &CancellationToken,
) {
    let text = unit.text().to_owned();
    observers.broadcast(StateMessage::speaking(&text));
    info!("assistant: {text}");

    let (buf_tx, mut buf_rx) = mpsc::channel::<Result<Vec<f32>>>(AUDIO_CHANNEL_CAPACITY);
    let synth = Arc::clone(synthesizer);
    let producer = tokio::task::spawn_blocking(move || match synth.synthesize(&text) {
        Ok(buffers) => {
            for buffer in buffers {
                let failed = buffer.is_err();
                if buf_tx.blocking_send(buffer).is_err() || failed {
                    break;
                }
            }
        }
        Err(e) => {
            let _ = buf_tx.blocking_send(Err(e));
        }
    });

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            buffer = buf_rx.recv() => match buffer {
                Some(Ok(samples)) if samples.is_empty() => {}
                Some(Ok(samples)) => {
                    observers.broadcast(StateMessage::audio(samples));
                }
                Some(Err(e)) => {
                    error!("TTS error: {e}");
                    break;
                }
                None => break,
            }
        }
    }

    // Closing the receiver unblocks a producer stuck on a full channel.
    drop(buf_rx);
    if let Err(e) = producer.await {
        error!("synthesis task failed: {e}");
    }
}
