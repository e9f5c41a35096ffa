//! User cancellation. Ctrl-C raises a flag instead of killing the process so
//! a batch can stop between items and still save what it finished.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sleep {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag on every Ctrl-C for the rest of the process.
    pub fn listen(&self) -> JoinHandle<()> {
        let flag = Arc::clone(&self.flag);
        tokio::spawn(async move {
            loop {
                if let Err(err) = signal::ctrl_c().await {
                    tracing::warn!(error = %err, "failed to install Ctrl+C handler");
                    break;
                }
                tracing::debug!("interrupt received");
                flag.store(true, Ordering::SeqCst);
            }
        })
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns whether the flag was raised and lowers it.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Sleeps for `duration` unless interrupted first. Consumes the flag.
    /// A duration past the clock's range only ends by interruption.
    pub async fn sleep(&self, duration: Duration) -> Sleep {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.take() {
                return Sleep::Interrupted;
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => TICK,
            };
            if remaining.is_zero() {
                return Sleep::Completed;
            }
            time::sleep(TICK.min(remaining)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_sleep_completes() {
        let interrupt = Interrupt::new();
        assert_eq!(interrupt.sleep(Duration::from_millis(20)).await, Sleep::Completed);
    }

    #[tokio::test]
    async fn raised_flag_cuts_sleep_short_and_is_consumed() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        let started = std::time::Instant::now();
        assert_eq!(interrupt.sleep(Duration::from_secs(30)).await, Sleep::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!interrupt.is_raised());
    }

    #[tokio::test]
    async fn unbounded_sleep_still_ends_on_interrupt() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        assert_eq!(interrupt.sleep(Duration::MAX).await, Sleep::Interrupted);
    }

    #[tokio::test]
    async fn raise_from_another_task_wakes_sleeper() {
        let interrupt = Interrupt::new();
        let remote = interrupt.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            remote.raise();
        });
        assert_eq!(interrupt.sleep(Duration::from_secs(30)).await, Sleep::Interrupted);
    }

    #[test]
    fn take_reports_once() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.take());
        interrupt.raise();
        assert!(interrupt.take());
        assert!(!interrupt.take());
    }
}
