use std::path::PathBuf;
use std::time::Duration;

use mpbar_core::{
    Granularity, Pool, ProgressSession, RenderState, SessionOptions, WatcherSettings,
};

use crate::CliError;
use crate::progress::BarFactory;
use crate::worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Workers are threads of this process.
    Threads,
    /// Workers are child processes.
    Processes,
}

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub iterations: usize,
    pub workers: Option<usize>,
    pub mode: Mode,
    pub sleep_max_ms: u64,
    pub fail_at: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarSummary {
    pub description: String,
    pub completed: u64,
    pub total: Option<u64>,
}

impl From<&RenderState> for BarSummary {
    fn from(state: &RenderState) -> Self {
        Self {
            description: state.description.clone(),
            completed: state.completed,
            total: state.total,
        }
    }
}

/// Final count of every bar the demo drew.
#[derive(Debug)]
pub struct DemoSummary {
    pub bars: Vec<BarSummary>,
}

/// Nested bars: an outer "Bars done" stage bar around a worker-driven
/// "Sleep Iteration" bar and a `map` driven "Map Iteration" bar.
pub fn run(
    options: &DemoOptions,
    bars: &BarFactory,
    settings: WatcherSettings,
) -> Result<DemoSummary, CliError> {
    let pool = mpbar_core::thread_pool(options.workers)?;
    let n = options.iterations;

    let outer = ProgressSession::open_with(
        SessionOptions::new("Bars done").total(2).leave(true),
        settings,
        bars.bar(),
    )?;

    let inner = ProgressSession::open_with(
        SessionOptions::new("Sleep Iteration")
            .total(n as u64)
            .leave(false),
        settings,
        bars.bar(),
    )?;
    let delays: Vec<u64> = (0..n).map(|i| delay_ms(i, options.sleep_max_ms)).collect();
    match options.mode {
        Mode::Threads => {
            let proxy = inner.new_proxy();
            pool.map_ordered(delays, |delay| {
                std::thread::sleep(Duration::from_millis(delay));
                proxy.update(1)
            })
            .into_iter()
            .collect::<Result<Vec<()>, _>>()?;
        }
        Mode::Processes => {
            let exe: PathBuf = std::env::current_exe().map_err(CliError::Launch)?;
            worker::run_in_processes(&pool, &exe, &inner, delays)?;
        }
    }
    let sleep_state = inner.close()?;
    outer.update(1)?;

    let items: Vec<usize> = (0..n).collect();
    let fail_at = options.fail_at;
    let sleep_max_ms = options.sleep_max_ms;
    let (_, map_state) = mpbar_core::map_with_state(
        &pool,
        items,
        SessionOptions::new("Map Iteration").leave(false),
        settings,
        Granularity::PerItem,
        bars.bar(),
        |i, _| {
            if fail_at == Some(i) {
                return Err(CliError::Worker {
                    index: i,
                    reason: "injected failure".to_string(),
                });
            }
            std::thread::sleep(Duration::from_millis(delay_ms(i, sleep_max_ms)));
            Ok(i)
        },
    )?;
    outer.update(1)?;
    let outer_state = outer.close()?;

    Ok(DemoSummary {
        bars: vec![
            BarSummary::from(&outer_state),
            BarSummary::from(&sleep_state),
            BarSummary::from(&map_state),
        ],
    })
}

/// Deterministic spread of sleep times in `0..=max`.
fn delay_ms(index: usize, max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    (index as u64).wrapping_mul(37) % max.saturating_add(1)
}
