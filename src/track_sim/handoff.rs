// ==============================================================================
// handoff.rs — SIMULATION -> CONSUMER DOUBLE BUFFER
// ------------------------------------------------------------------------------
// Back buffer:  owned TickOutput, written only by the simulation step.
// Front buffer: Arc<TickOutput> in a tokio watch channel.
//
// publish() moves the finished back buffer into the front slot in one swap at
// the step boundary; readers clone the Arc and never see a partial step. The
// replaced front value comes back as the next back buffer when no reader
// still holds it (its Vecs are reused), otherwise it is cloned.
// ==============================================================================

use std::sync::Arc;

use tokio::sync::watch;

use crate::track_sim::types::TickOutput;

pub struct HandoffWriter {
    back: TickOutput,
    tx: watch::Sender<Arc<TickOutput>>,
    discarded: bool,
}

#[derive(Clone)]
pub struct HandoffReader {
    rx: watch::Receiver<Arc<TickOutput>>,
}

/// `initial` is what readers see before the first publish.
pub fn channel(initial: TickOutput) -> (HandoffWriter, HandoffReader) {
    let (tx, rx) = watch::channel(Arc::new(initial.clone()));
    (
        HandoffWriter { back: initial, tx, discarded: false },
        HandoffReader { rx },
    )
}

impl HandoffWriter {
    /// Buffer for the step in progress.
    pub fn back_mut(&mut self) -> &mut TickOutput {
        &mut self.back
    }

    /// Make the back buffer the latest completed step.
    pub fn publish(&mut self) -> Arc<TickOutput> {
        let complete = Arc::new(std::mem::take(&mut self.back));
        if self.discarded {
            return complete;
        }
        let previous = self.tx.send_replace(Arc::clone(&complete));
        self.back = Arc::try_unwrap(previous).unwrap_or_else(|shared| (*shared).clone());
        complete
    }

    /// Drop in-flight output; nothing is published after this.
    pub fn discard(&mut self) {
        self.discarded = true;
        self.back = TickOutput::default();
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn subscribe(&self) -> HandoffReader {
        HandoffReader { rx: self.tx.subscribe() }
    }
}

impl HandoffReader {
    /// Latest completed step.
    pub fn latest(&self) -> Arc<TickOutput> {
        Arc::clone(&self.rx.borrow())
    }

    /// Latest completed step, marking it seen.
    pub fn latest_and_mark_seen(&mut self) -> Arc<TickOutput> {
        Arc::clone(&self.rx.borrow_and_update())
    }

    /// Wait for a newer step. Errors once the writer is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }

    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}
