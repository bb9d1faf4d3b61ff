use std::fmt;
#[cfg(test)]
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Trait for the terminal widget that displays one bar.
///
/// Core defines this trait; the CLI implements it with `indicatif`.
/// Tests use `SilentRenderer` (no-op) or `RecordingRenderer`.
///
/// A renderer is owned by exactly one session and is only touched by that
/// session's watcher thread while the session is open.
pub trait Renderer: Send {
    fn set_total(&mut self, total: Option<u64>) -> Result<(), RenderError>;
    fn set_description(&mut self, description: &str) -> Result<(), RenderError>;
    fn set_postfix(&mut self, postfix: &Postfix) -> Result<(), RenderError>;
    fn advance(&mut self, n: u64) -> Result<(), RenderError>;
    /// Finish the bar. With `leave` the bar stays on screen as a completed
    /// line, otherwise it is erased.
    fn close(&mut self, leave: bool) -> Result<(), RenderError>;
}

/// A failure inside a renderer. Never fatal to the watcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// Ordered `key=value` pairs shown after the bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Postfix(Vec<(String, String)>);

impl Postfix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair, replacing the value if the key already exists.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Postfix {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Postfix::new(), |postfix, (k, v)| postfix.with(k, v))
    }
}

impl fmt::Display for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// What a bar currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderState {
    pub completed: u64,
    /// `None` means the total is unknown.
    pub total: Option<u64>,
    pub description: String,
    pub postfix: Postfix,
    pub leave: bool,
}

/// No-op renderer for tests and non-interactive use.
pub struct SilentRenderer;

impl Renderer for SilentRenderer {
    fn set_total(&mut self, _total: Option<u64>) -> Result<(), RenderError> {
        Ok(())
    }
    fn set_description(&mut self, _description: &str) -> Result<(), RenderError> {
        Ok(())
    }
    fn set_postfix(&mut self, _postfix: &Postfix) -> Result<(), RenderError> {
        Ok(())
    }
    fn advance(&mut self, _n: u64) -> Result<(), RenderError> {
        Ok(())
    }
    fn close(&mut self, _leave: bool) -> Result<(), RenderError> {
        Ok(())
    }
}

/// A call observed by `RecordingRenderer`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Total(Option<u64>),
    Description(String),
    Postfix(Postfix),
    Advance(u64),
    Close { leave: bool },
}

/// Renderer that records every call. Clones share the same log, so a
/// test can keep one clone while the session owns the other.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    events: Arc<Mutex<Vec<RenderEvent>>>,
}

#[cfg(test)]
impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Sum of all `advance` calls seen so far.
    pub fn advanced(&self) -> u64 {
        self.events()
            .iter()
            .map(|e| match e {
                RenderEvent::Advance(n) => *n,
                _ => 0,
            })
            .sum()
    }

    /// The `leave` flag of the close call, if the bar was closed.
    pub fn closed(&self) -> Option<bool> {
        self.events().iter().find_map(|e| match e {
            RenderEvent::Close { leave } => Some(*leave),
            _ => None,
        })
    }

    fn record(&self, event: RenderEvent) -> Result<(), RenderError> {
        self.events
            .lock()
            .map_err(|_| RenderError("event log poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
impl Renderer for RecordingRenderer {
    fn set_total(&mut self, total: Option<u64>) -> Result<(), RenderError> {
        self.record(RenderEvent::Total(total))
    }
    fn set_description(&mut self, description: &str) -> Result<(), RenderError> {
        self.record(RenderEvent::Description(description.to_string()))
    }
    fn set_postfix(&mut self, postfix: &Postfix) -> Result<(), RenderError> {
        self.record(RenderEvent::Postfix(postfix.clone()))
    }
    fn advance(&mut self, n: u64) -> Result<(), RenderError> {
        self.record(RenderEvent::Advance(n))
    }
    fn close(&mut self, leave: bool) -> Result<(), RenderError> {
        self.record(RenderEvent::Close { leave })
    }
}
