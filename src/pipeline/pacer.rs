//! Pacer: keep the upload loop under the GitHub API rate limit.
//!
//! The baseline is purely time-based: after every `batch_size` upload
//! attempts the run pauses for `pause`. On top of that the pacer honours
//! what the API reports. When a response says the quota is exhausted, or a
//! rejection carries `retry-after`, it waits for that long instead (never
//! longer than `max_wait`).
//!
//! Waits are owed, not taken: recording an attempt only notes how long the
//! next upload must hold off, and [`Pacer::ready`] pays it just before that
//! upload. A run whose last upload ends a batch therefore finishes at once.

use crate::progress::ProgressCallback;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::info;

/// Rate-limit state reported by the API on a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    /// Requests left in the current window.
    pub remaining: u64,
    /// Window reset, seconds since the Unix epoch.
    pub reset_epoch_secs: u64,
}

impl RateQuota {
    /// Time until the window resets, as seen at `now_epoch_secs`.
    pub fn wait_from(&self, now_epoch_secs: u64) -> Duration {
        Duration::from_secs(self.reset_epoch_secs.saturating_sub(now_epoch_secs))
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Counts upload attempts and spaces them out.
pub struct Pacer {
    every: usize,
    pause: Duration,
    max_wait: Duration,
    count: usize,
    owed: Duration,
    progress: Option<ProgressCallback>,
}

impl Pacer {
    pub fn new(every: usize, pause: Duration, max_wait: Duration) -> Self {
        Self {
            every: every.max(1),
            pause,
            max_wait,
            count: 0,
            owed: Duration::ZERO,
            progress: None,
        }
    }

    pub fn with_progress(mut self, cb: Option<ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    /// Upload attempts seen so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Wait still owed before the next upload.
    pub fn owed(&self) -> Duration {
        self.owed
    }

    /// Call before each upload attempt; sleeps off whatever is owed.
    pub async fn ready(&mut self) {
        let wait = std::mem::take(&mut self.owed);
        if wait.is_zero() {
            return;
        }
        if let Some(ref cb) = self.progress {
            cb.on_pause(wait);
        }
        sleep(wait).await;
    }

    /// Call once per completed upload attempt, successful or not.
    pub fn note_upload(&mut self) {
        self.count += 1;
        if self.count % self.every == 0 && !self.pause.is_zero() {
            info!(
                "{} uploads done; pausing {}s before the next one",
                self.count,
                self.pause.as_secs_f32()
            );
            self.owe(self.pause);
        }
    }

    /// Hold off until the quota window resets when the API reports none left.
    pub fn observe_quota(&mut self, quota: RateQuota) {
        if quota.remaining > 0 {
            return;
        }
        let wait = quota.wait_from(now_epoch_secs());
        if !wait.is_zero() {
            info!("API quota exhausted; waiting {}s for reset", wait.as_secs());
            self.owe(wait);
        }
    }

    /// Honour a `retry-after` from a rejected request.
    pub fn observe_retry_after(&mut self, secs: u64) {
        if secs > 0 {
            info!("API asked to retry after {}s", secs);
            self.owe(Duration::from_secs(secs));
        }
    }

    /// Waits overlap rather than add up; the longest one wins.
    fn owe(&mut self, wait: Duration) {
        self.owed = self.owed.max(wait.min(self.max_wait));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn assert_elapsed(start: Instant, secs: u64) {
        let e = start.elapsed();
        assert!(
            e >= Duration::from_secs(secs) && e < Duration::from_secs(secs) + Duration::from_millis(500),
            "expected ~{secs}s, got {e:?}"
        );
    }

    /// One upload as the migration loop drives it.
    async fn upload(pacer: &mut Pacer) {
        pacer.ready().await;
        pacer.note_upload();
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_batches_of_k() {
        let mut pacer = Pacer::new(3, Duration::from_secs(10), Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..3 {
            upload(&mut pacer).await;
        }
        assert_elapsed(start, 0);
        assert_eq!(pacer.owed(), Duration::from_secs(10));

        upload(&mut pacer).await;
        assert_elapsed(start, 10);

        for _ in 0..3 {
            upload(&mut pacer).await;
        }
        assert_elapsed(start, 20);
        assert_eq!(pacer.count(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn no_pause_after_the_last_upload() {
        let mut pacer = Pacer::new(2, Duration::from_secs(10), Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..4 {
            upload(&mut pacer).await;
        }
        // Only the pause between the two batches was taken.
        assert_elapsed(start, 10);
        assert_eq!(pacer.owed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_pause_never_sleeps() {
        let mut pacer = Pacer::new(1, Duration::ZERO, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..5 {
            upload(&mut pacer).await;
        }
        assert_elapsed(start, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_quota_waits_until_reset_capped() {
        let mut pacer = Pacer::new(10, Duration::ZERO, Duration::from_secs(30));
        let start = Instant::now();

        pacer.observe_quota(RateQuota {
            remaining: 5,
            reset_epoch_secs: now_epoch_secs() + 1000,
        });
        pacer.ready().await;
        assert_elapsed(start, 0);

        pacer.observe_quota(RateQuota {
            remaining: 0,
            reset_epoch_secs: now_epoch_secs() + 1000,
        });
        assert_eq!(pacer.owed(), Duration::from_secs(30));
        pacer.ready().await;
        assert_elapsed(start, 30);
        assert_eq!(pacer.owed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_honoured() {
        let mut pacer = Pacer::new(10, Duration::ZERO, Duration::from_secs(300));
        let start = Instant::now();
        pacer.observe_retry_after(42);
        pacer.ready().await;
        assert_elapsed(start, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_waits_take_the_longest() {
        let mut pacer = Pacer::new(1, Duration::from_secs(10), Duration::from_secs(300));
        let start = Instant::now();
        pacer.observe_retry_after(25);
        pacer.note_upload();
        assert_eq!(pacer.owed(), Duration::from_secs(25));
        pacer.ready().await;
        assert_elapsed(start, 25);
    }

    #[test]
    fn quota_wait_saturates() {
        let q = RateQuota {
            remaining: 0,
            reset_epoch_secs: 100,
        };
        assert_eq!(q.wait_from(40), Duration::from_secs(60));
        assert_eq!(q.wait_from(200), Duration::ZERO);
    }
}
