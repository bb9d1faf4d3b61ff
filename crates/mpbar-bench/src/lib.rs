use std::time::Duration;

use mpbar_core::{ProgressProxy, ProgressSession, SessionOptions, SilentRenderer, WatcherSettings};

/// Short poll interval so session shutdown does not dominate a sample.
pub fn bench_settings(channel_capacity: Option<usize>) -> WatcherSettings {
    WatcherSettings {
        poll_interval: Duration::from_millis(1),
        channel_capacity,
    }
}

/// Open a session drawing nothing, sized for `total` updates.
pub fn silent_session(total: u64, channel_capacity: Option<usize>) -> ProgressSession {
    ProgressSession::open_with(
        SessionOptions::new("bench").total(total),
        bench_settings(channel_capacity),
        Box::new(SilentRenderer),
    )
    .expect("bench session failed to open")
}

/// Send `per_producer` unit updates from each of `producers` threads, close
/// the session and return the count the bar saw.
pub fn drive(producers: usize, per_producer: u64, channel_capacity: Option<usize>) -> u64 {
    let session = silent_session(producers as u64 * per_producer, channel_capacity);
    std::thread::scope(|s| {
        for _ in 0..producers {
            let proxy: ProgressProxy = session.new_proxy();
            s.spawn(move || {
                for _ in 0..per_producer {
                    proxy.update(1).expect("bench update failed");
                }
            });
        }
    });
    session.close().expect("bench session failed to close").completed
}

/// One frame per line, as a child process would write them.
pub fn frame_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            if i % 10 == 9 {
                format!(r#"{{"channel":1,"message":{{"postfix":[["item","{i}"]]}}}}"#)
            } else {
                r#"{"channel":1,"message":{"advance":1}}"#.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_counts_every_update() {
        assert_eq!(drive(4, 50, None), 200);
        assert_eq!(drive(2, 25, Some(4)), 50);
    }

    #[test]
    fn frame_lines_decode() {
        for line in frame_lines(20) {
            mpbar_core::wire::decode_frame(&line).unwrap();
        }
    }
}
