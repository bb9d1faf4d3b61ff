use rayon::prelude::*;

use crate::ProgressError;

/// A parallel-map primitive that returns results in input order.
pub trait Pool {
    fn map_ordered<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send;
}

impl Pool for rayon::ThreadPool {
    fn map_ordered<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        self.install(|| items.into_par_iter().map(f).collect())
    }
}

/// Runs every item on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl Pool for Sequential {
    fn map_ordered<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        items.into_iter().map(f).collect()
    }
}

/// Build a rayon pool with named worker threads. `None` lets rayon pick
/// one thread per core.
pub fn thread_pool(workers: Option<usize>) -> Result<rayon::ThreadPool, ProgressError> {
    if workers == Some(0) {
        return Err(ProgressError::InvalidArgument(
            "worker count must be greater than zero".to_string(),
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("mpbar-worker-{i}"));
    if let Some(n) = workers {
        builder = builder.num_threads(n);
    }
    Ok(builder.build()?)
}
