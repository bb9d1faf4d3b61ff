//! Running work items in child processes.
//!
//! Each item re-executes the current binary as `mpbar worker`, handing it
//! the session's proxy as JSON. The child binds the proxy to its stdout and
//! the parent relays that pipe into the session.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use mpbar_core::{Pool, ProgressProxy, ProgressSession};

use crate::CliError;

pub const WORKER_COMMAND: &str = "worker";

/// Run one child per delay on `pool`, each advancing `session` by one.
pub fn run_in_processes<P: Pool>(
    pool: &P,
    exe: &Path,
    session: &ProgressSession,
    delays_ms: Vec<u64>,
) -> Result<(), CliError> {
    let proxy = serde_json::to_string(&session.new_proxy()).map_err(CliError::Proxy)?;
    let jobs: Vec<(usize, u64)> = delays_ms.into_iter().enumerate().collect();
    pool.map_ordered(jobs, |(index, delay)| {
        spawn_worker(exe, &proxy, session, index, delay)
    })
    .into_iter()
    .collect()
}

fn spawn_worker(
    exe: &Path,
    proxy: &str,
    session: &ProgressSession,
    index: usize,
    sleep_ms: u64,
) -> Result<(), CliError> {
    let mut child = Command::new(exe)
        .args([WORKER_COMMAND, "--proxy", proxy, "--sleep-ms"])
        .arg(sleep_ms.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(CliError::Launch)?;

    let Some(stdout) = child.stdout.take() else {
        reap(&mut child, index);
        return Err(CliError::Worker {
            index,
            reason: "stdout was not captured".to_string(),
        });
    };
    let forwarder = match session.attach(stdout) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            reap(&mut child, index);
            return Err(e.into());
        }
    };
    let status = child.wait().map_err(CliError::Launch)?;
    let stats = forwarder.join()?;
    log::debug!(
        "worker {index} exited with {status} ({} updates relayed)",
        stats.forwarded
    );

    if !status.success() {
        return Err(CliError::Worker {
            index,
            reason: format!("exited with {status}"),
        });
    }
    Ok(())
}

/// Kill and wait a child whose output nobody will read.
fn reap(child: &mut Child, index: usize) {
    if let Err(e) = child.kill() {
        log::debug!("worker {index}: kill failed: {e}");
    }
    if let Err(e) = child.wait() {
        log::warn!("worker {index}: wait failed: {e}");
    }
}

/// Entry point of `mpbar worker`.
pub fn worker_main(proxy: &str, sleep_ms: u64, fail: bool) -> Result<(), CliError> {
    let proxy: ProgressProxy = serde_json::from_str(proxy).map_err(CliError::Proxy)?;
    let proxy = proxy.bind(std::io::stdout());

    std::thread::sleep(Duration::from_millis(sleep_ms));
    if fail {
        return Err(CliError::Worker {
            index: 0,
            reason: "failure requested".to_string(),
        });
    }
    proxy.update(1)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_main_rejects_malformed_proxy() {
        assert!(matches!(
            worker_main("not json", 0, false),
            Err(CliError::Proxy(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn reap_kills_and_waits_a_running_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        reap(&mut child, 0);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn worker_main_honours_fail_flag() {
        let err = worker_main(r#"{"channel":1}"#, 0, true).unwrap_err();
        assert!(err.to_string().contains("failure requested"));
    }
}
