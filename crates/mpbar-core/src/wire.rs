//! Line-delimited JSON framing for updates that cross a process boundary.
//!
//! A child process writes one [`Frame`] per line to a byte stream it shares
//! with the parent (typically its stdout pipe). The parent runs a
//! [`Forwarder`] that decodes the frames and feeds them into the session's
//! update channel.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::ProgressError;
use crate::channel::{Message, UpdateSender};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode frame: {0}")]
    Encode(serde_json::Error),
    #[error("failed to write frame: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame {line:?}: {source}")]
    Decode {
        line: String,
        source: serde_json::Error,
    },
}

/// Identifies the session a frame belongs to. Unique within one parent
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub channel: ChannelId,
    pub message: Message,
}

pub fn encode_frame(frame: &Frame) -> Result<String, WireError> {
    serde_json::to_string(frame).map_err(WireError::Encode)
}

/// Write one frame followed by a newline and flush, so the parent sees it
/// promptly even through a buffered pipe.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &Frame) -> Result<(), WireError> {
    let line = encode_frame(frame)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn decode_frame(line: &str) -> Result<Frame, WireError> {
    serde_json::from_str(line.trim()).map_err(|source| WireError::Decode {
        line: line.to_string(),
        source,
    })
}

/// Counters reported by a finished forwarder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub forwarded: u64,
    pub skipped: u64,
}

/// Background thread relaying frames from a byte stream into a channel.
#[derive(Debug)]
pub struct Forwarder {
    handle: JoinHandle<ForwardStats>,
}

impl Forwarder {
    pub(crate) fn spawn<R>(
        channel: ChannelId,
        sender: UpdateSender,
        reader: R,
    ) -> Result<Self, ProgressError>
    where
        R: Read + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name(format!("mpbar-forward-{}", channel.0))
            .spawn(move || forward(channel, &sender, reader))
            .map_err(ProgressError::Spawn)?;
        Ok(Self { handle })
    }

    /// Wait until the stream hits end-of-file.
    pub fn join(self) -> Result<ForwardStats, ProgressError> {
        self.handle
            .join()
            .map_err(|_| ProgressError::InvalidState("forwarder thread panicked".to_string()))
    }
}

fn forward<R: Read>(channel: ChannelId, sender: &UpdateSender, reader: R) -> ForwardStats {
    let mut stats = ForwardStats::default();
    // Keep reading after failures so the writer never blocks on a full pipe.
    for line in BufReader::new(reader).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::warn!("forwarder {channel}: read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let frame = match decode_frame(&line) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("forwarder {channel}: skipping line: {e}");
                stats.skipped += 1;
                continue;
            }
        };
        if frame.channel != channel {
            log::warn!(
                "forwarder {channel}: skipping frame addressed to {}",
                frame.channel
            );
            stats.skipped += 1;
            continue;
        }
        if frame.message == Message::Advance(0) {
            log::warn!("forwarder {channel}: skipping zero advance");
            stats.skipped += 1;
            continue;
        }
        match sender.send(frame.message) {
            Ok(()) => stats.forwarded += 1,
            Err(e) => {
                log::warn!("forwarder {channel}: dropping update: {e}");
                stats.skipped += 1;
            }
        }
    }
    log::trace!(
        "forwarder {channel}: done ({} forwarded, {} skipped)",
        stats.forwarded,
        stats.skipped
    );
    stats
}
