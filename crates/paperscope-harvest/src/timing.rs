//! Wall-clock timing around a future. Pure pass-through: the wrapped output is
//! returned untouched.

use std::future::Future;
use std::time::{Duration, Instant};

/// Await `fut`, log how long it took under `label`, and return its output along
/// with the elapsed time.
pub async fn timed<F>(label: &str, fut: F) -> (F::Output, Duration)
where
    F: Future,
{
    let start = Instant::now();
    tracing::debug!(%label, "starting");
    let output = fut.await;
    let elapsed = start.elapsed();
    tracing::debug!(%label, took = %format_elapsed(elapsed), "completed");
    (output, elapsed)
}

/// `"2.35s"` under a minute, `"3m 4.50s"` above.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.2}s")
    } else {
        let minutes = (secs / 60.0).floor() as u64;
        format!("{minutes}m {:.2}s", secs - (minutes as f64) * 60.0)
    }
}
