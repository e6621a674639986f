//! Progress reporting and cancellation for the drive loop

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::utils::time::format_duration;

/// Answer of a progress sink: keep going or stop between two packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Continue,
    Cancel,
}

/// Receives `(processed, total_estimate)` after every drive step
///
/// Units are seconds of output timeline.
pub trait ProgressSink {
    fn on_progress(&mut self, processed: f64, total: f64) -> JobStatus;
}

impl<F> ProgressSink for F
where
    F: FnMut(f64, f64) -> JobStatus,
{
    fn on_progress(&mut self, processed: f64, total: f64) -> JobStatus {
        self(processed, total)
    }
}

/// Sink that ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _processed: f64, _total: f64) -> JobStatus {
        JobStatus::Continue
    }
}

/// Snapshot of a running job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Progress percentage (0.0 - 100.0)
    pub percent: f64,
    pub processed: f64,
    pub total: f64,
    pub elapsed: Duration,
    /// Estimated time remaining
    pub eta: Option<Duration>,
    /// Output seconds produced per wall clock second
    pub speed: Option<f64>,
}

impl ProgressInfo {
    pub fn compute(processed: f64, total: f64, elapsed: Duration) -> Self {
        let percent = if total > 0.0 {
            (processed / total * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let seconds = elapsed.as_secs_f64();
        let speed = (seconds > 0.0 && processed > 0.0).then(|| processed / seconds);
        let eta = match speed {
            Some(rate) if percent < 100.0 => {
                Some(Duration::from_secs_f64((total - processed).max(0.0) / rate))
            }
            _ => None,
        };

        Self {
            percent,
            processed,
            total,
            elapsed,
            eta,
            speed,
        }
    }

    /// Single line rendering with a text bar
    pub fn render(&self, bar_length: usize) -> String {
        let filled = ((self.percent / 100.0) * bar_length as f64) as usize;
        let filled = filled.min(bar_length);
        let bar = "#".repeat(filled) + &"-".repeat(bar_length - filled);

        let mut line = format!(
            "[{}] {:>5.1}% {} / {}",
            bar,
            self.percent,
            format_duration(self.processed),
            format_duration(self.total)
        );
        if let Some(speed) = self.speed {
            line.push_str(&format!(" {:.1}x", speed));
        }
        if let Some(eta) = self.eta {
            line.push_str(&format!(" ETA {}", format_duration(eta.as_secs_f64())));
        }
        line
    }
}

/// Throttled progress line on stderr
pub struct ConsoleProgress {
    start_time: Instant,
    last_update: Option<Instant>,
    update_interval: Duration,
    out: Box<dyn Write + Send>,
    drawn: bool,
}

impl ConsoleProgress {
    pub fn new(update_interval: Duration) -> Self {
        Self::with_writer(update_interval, Box::new(io::stderr()))
    }

    pub fn with_writer(update_interval: Duration, out: Box<dyn Write + Send>) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: None,
            update_interval,
            out,
            drawn: false,
        }
    }

    /// Terminate the progress line
    pub fn finish(&mut self) {
        if self.drawn {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.drawn = false;
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn on_progress(&mut self, processed: f64, total: f64) -> JobStatus {
        let now = Instant::now();
        let due = self
            .last_update
            .map_or(true, |last| now.duration_since(last) >= self.update_interval);
        if due {
            self.last_update = Some(now);
            let info = ProgressInfo::compute(processed, total, now.duration_since(self.start_time));
            let _ = write!(self.out, "\r{}", info.render(30));
            let _ = self.out.flush();
            self.drawn = true;
        }
        JobStatus::Continue
    }
}

impl Drop for ConsoleProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Cancels the job once `flag` is raised (e.g. by a Ctrl-C handler)
pub struct CancelOnFlag<S> {
    inner: S,
    flag: Arc<AtomicBool>,
}

impl<S: ProgressSink> CancelOnFlag<S> {
    pub fn new(inner: S, flag: Arc<AtomicBool>) -> Self {
        Self { inner, flag }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ProgressSink> ProgressSink for CancelOnFlag<S> {
    fn on_progress(&mut self, processed: f64, total: f64) -> JobStatus {
        if self.flag.load(Ordering::SeqCst) {
            return JobStatus::Cancel;
        }
        self.inner.on_progress(processed, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_progress_info_compute() {
        let info = ProgressInfo::compute(5.0, 20.0, Duration::from_secs(1));
        assert_eq!(info.percent, 25.0);
        assert_eq!(info.speed, Some(5.0));
        assert_eq!(info.eta, Some(Duration::from_secs(3)));

        let done = ProgressInfo::compute(20.0, 20.0, Duration::from_secs(4));
        assert_eq!(done.percent, 100.0);
        assert_eq!(done.eta, None);

        let unknown = ProgressInfo::compute(3.0, 0.0, Duration::from_secs(1));
        assert_eq!(unknown.percent, 0.0);
    }

    #[test]
    fn test_progress_render() {
        let info = ProgressInfo::compute(10.0, 20.0, Duration::ZERO);
        let line = info.render(10);
        assert!(line.starts_with("[#####-----]  50.0%"));
        assert!(!line.contains("ETA"));
    }

    #[test]
    fn test_console_progress_throttles() {
        let buffer = SharedBuffer::default();
        let mut console =
            ConsoleProgress::with_writer(Duration::from_secs(3600), Box::new(buffer.clone()));

        assert_eq!(console.on_progress(1.0, 10.0), JobStatus::Continue);
        assert_eq!(console.on_progress(2.0, 10.0), JobStatus::Continue);
        console.finish();

        let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written.matches('\r').count(), 1);
        assert!(written.ends_with('\n'));
    }

    #[test]
    fn test_cancel_on_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut calls = 0;
        let mut sink = CancelOnFlag::new(
            |_: f64, _: f64| {
                calls += 1;
                JobStatus::Continue
            },
            Arc::clone(&flag),
        );

        assert_eq!(sink.on_progress(1.0, 2.0), JobStatus::Continue);
        flag.store(true, Ordering::SeqCst);
        assert_eq!(sink.on_progress(1.5, 2.0), JobStatus::Cancel);
        drop(sink);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        let mut sink = |processed: f64, total: f64| {
            seen.push((processed, total));
            JobStatus::Continue
        };
        sink.on_progress(1.0, 4.0);
        sink.on_progress(2.0, 4.0);
        assert_eq!(seen, vec![(1.0, 4.0), (2.0, 4.0)]);
    }
}
