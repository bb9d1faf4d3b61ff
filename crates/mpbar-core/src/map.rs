use crate::ProgressError;
use crate::pool::Pool;
use crate::progress::{RenderState, Renderer};
use crate::proxy::ProgressProxy;
use crate::session::{ProgressSession, SessionOptions, WatcherSettings};

/// Who advances the bar during [`map`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Granularity {
    /// Advance by one after each item returns successfully.
    #[default]
    PerItem,
    /// The mapped function reports progress itself through the proxy.
    Manual,
}

/// Map `f` over `items` on `pool` behind a progress bar.
///
/// The bar's total is `options.total` when set, otherwise the number of
/// items. Results keep input order. If any call fails, the first error in
/// input order is returned unchanged once the bar is closed.
pub fn map<P, T, R, E, F>(
    pool: &P,
    items: Vec<T>,
    options: SessionOptions,
    settings: WatcherSettings,
    granularity: Granularity,
    renderer: Box<dyn Renderer>,
    f: F,
) -> Result<Vec<R>, E>
where
    P: Pool,
    T: Send,
    R: Send,
    E: From<ProgressError> + Send,
    F: Fn(T, &ProgressProxy) -> Result<R, E> + Sync + Send,
{
    map_with_state(pool, items, options, settings, granularity, renderer, f)
        .map(|(results, _)| results)
}

/// [`map`], also returning the bar's final state.
pub fn map_with_state<P, T, R, E, F>(
    pool: &P,
    items: Vec<T>,
    options: SessionOptions,
    settings: WatcherSettings,
    granularity: Granularity,
    renderer: Box<dyn Renderer>,
    f: F,
) -> Result<(Vec<R>, RenderState), E>
where
    P: Pool,
    T: Send,
    R: Send,
    E: From<ProgressError> + Send,
    F: Fn(T, &ProgressProxy) -> Result<R, E> + Sync + Send,
{
    let total = options.total.unwrap_or(items.len() as u64);
    let options = SessionOptions {
        total: Some(total),
        ..options
    };

    ProgressSession::scope_with_state(options, settings, renderer, |session| {
        let proxy = session.new_proxy();
        let results = pool.map_ordered(items, |item| match granularity {
            Granularity::PerItem => proxy.try_run_and_update(|item| f(item, &proxy), item),
            Granularity::Manual => f(item, &proxy),
        });
        results.into_iter().collect()
    })
}
