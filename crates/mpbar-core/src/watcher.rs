//! Background thread that drains the update channel into a renderer.
//!
//! Lifecycle: `Created → Running → StopRequested → Drained → Terminated`.
//! The loop polls with a short timeout so a stop request is noticed even
//! when no worker is sending anything.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::ProgressError;
use crate::channel::{Message, Received, UpdateReceiver};
use crate::progress::{RenderError, RenderState, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatcherState {
    Created = 0,
    Running = 1,
    StopRequested = 2,
    Drained = 3,
    Terminated = 4,
}

impl WatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::StopRequested,
            3 => Self::Drained,
            _ => Self::Terminated,
        }
    }
}

/// What the watcher thread hands back when it terminates.
pub struct WatcherOutcome {
    pub renderer: Box<dyn Renderer>,
    pub state: RenderState,
    pub render_failures: u64,
}

struct Loop {
    receiver: UpdateReceiver,
    renderer: Box<dyn Renderer>,
    state: RenderState,
    poll_interval: Duration,
    stop: Arc<AtomicBool>,
    phase: Arc<AtomicU8>,
    render_failures: u64,
}

pub struct Watcher {
    name: String,
    stop: Arc<AtomicBool>,
    phase: Arc<AtomicU8>,
    pending: Mutex<Option<Loop>>,
    handle: Option<JoinHandle<WatcherOutcome>>,
}

impl Watcher {
    pub fn new(
        name: impl Into<String>,
        receiver: UpdateReceiver,
        renderer: Box<dyn Renderer>,
        state: RenderState,
        poll_interval: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let phase = Arc::new(AtomicU8::new(WatcherState::Created as u8));
        Self {
            name: name.into(),
            stop: Arc::clone(&stop),
            phase: Arc::clone(&phase),
            pending: Mutex::new(Some(Loop {
                receiver,
                renderer,
                state,
                poll_interval,
                stop,
                phase,
                render_failures: 0,
            })),
            handle: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        WatcherState::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn start(&mut self) -> Result<(), ProgressError> {
        let pending = self.pending.get_mut().map_err(|_| {
            ProgressError::InvalidState(format!("watcher {} poisoned", self.name))
        })?;
        let body = pending.take().ok_or_else(|| {
            ProgressError::InvalidState(format!("watcher {} already started", self.name))
        })?;
        self.phase
            .store(WatcherState::Running as u8, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || body.run());
        match spawned {
            Ok(handle) => {
                log::debug!("watcher {}: running", self.name);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.phase
                    .store(WatcherState::Terminated as u8, Ordering::SeqCst);
                Err(ProgressError::Spawn(e))
            }
        }
    }

    /// Ask the loop to finish. Idempotent.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait until every update sent before the stop
    /// request has been applied.
    pub fn stop_and_join(mut self) -> Result<WatcherOutcome, ProgressError> {
        self.request_stop();
        let handle = self.handle.take().ok_or_else(|| {
            ProgressError::InvalidState(format!("watcher {} was never started", self.name))
        })?;
        let outcome = handle.join().map_err(|_| {
            ProgressError::InvalidState(format!("watcher {} panicked", self.name))
        })?;
        log::debug!(
            "watcher {}: terminated at {} completed",
            self.name,
            outcome.state.completed
        );
        Ok(outcome)
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // A detached loop would otherwise poll forever.
        self.request_stop();
    }
}

impl Loop {
    fn run(mut self) -> WatcherOutcome {
        while !self.stop.load(Ordering::SeqCst) {
            match self.receiver.receive(self.poll_interval) {
                Received::Message(message) => self.apply(message),
                Received::Timeout => {}
                Received::Closed => break,
            }
        }

        self.set_phase(WatcherState::StopRequested);
        self.receiver.close();
        loop {
            match self.receiver.receive(self.poll_interval) {
                Received::Message(message) => self.apply(message),
                Received::Timeout => {}
                Received::Closed => break,
            }
        }
        self.set_phase(WatcherState::Drained);

        let outcome = WatcherOutcome {
            renderer: self.renderer,
            state: self.state,
            render_failures: self.render_failures,
        };
        self.phase
            .store(WatcherState::Terminated as u8, Ordering::SeqCst);
        outcome
    }

    fn set_phase(&self, phase: WatcherState) {
        self.phase.store(phase as u8, Ordering::SeqCst);
        log::trace!("watcher: {phase:?}");
    }

    fn apply(&mut self, message: Message) {
        let result = match message {
            Message::Advance(n) => {
                log::trace!("watcher: advance {n}");
                self.state.completed = self.state.completed.saturating_add(n);
                guarded(|| self.renderer.advance(n))
            }
            Message::Postfix(postfix) => {
                let result = guarded(|| self.renderer.set_postfix(&postfix));
                self.state.postfix = postfix;
                result
            }
        };
        if let Err(e) = result {
            self.render_failures += 1;
            log::warn!("progress bar {:?}: {e}", self.state.description);
        }
    }
}

/// Run a renderer call, turning a panic into an error.
fn guarded<F>(call: F) -> Result<(), RenderError>
where
    F: FnOnce() -> Result<(), RenderError>,
{
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|_| Err(RenderError("renderer panicked".to_string())))
}
