//! Aggregate progress reported by many worker threads or processes into a
//! single live progress bar owned by the coordinating process.
//!
//! Workers hold a [`ProgressProxy`] and call [`ProgressProxy::update`]. The
//! update travels through the session's [`channel`] (or, from another
//! process, as a [`wire`] frame) to a [`watcher`] thread that is the only
//! writer of the bar's [`Renderer`].

pub mod channel;
pub mod map;
pub mod pool;
pub mod progress;
pub mod proxy;
pub mod session;
pub mod watcher;
pub mod wire;

pub use map::{Granularity, map, map_with_state};
pub use pool::{Pool, Sequential, thread_pool};
pub use progress::{Postfix, RenderError, RenderState, Renderer, SilentRenderer};
pub use proxy::ProgressProxy;
pub use session::{ProgressSession, SessionOptions, WatcherSettings};

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Wire(#[from] wire::WireError),
    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),
    #[error("failed to build thread pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
