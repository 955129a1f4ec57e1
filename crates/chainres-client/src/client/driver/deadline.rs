//! Per-call deadlines and the tokens that carry them.

use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Cap on any deadline or budget. Keeps instants representable and
/// `grpc-timeout` within its 8-digit limit.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `base + offset`, with `offset` capped at [`FAR_FUTURE`].
pub fn instant_after(base: Instant, offset: Duration) -> Instant {
    base.checked_add(offset.min(FAR_FUTURE)).unwrap_or(base)
}

/// How the deadline of each call in a worker's burst is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DeadlinePolicy {
    /// Every call gets the full timeout, counted from when it is issued.
    #[default]
    Fixed,
    /// Call `k` must finish within `timeout + k * interval` of the worker's
    /// start, so later calls tolerate the drift accumulated before them.
    Linear,
}

impl DeadlinePolicy {
    /// Deadline of call `index`.
    pub fn deadline(
        self,
        worker_start: Instant,
        issued_at: Instant,
        index: usize,
        timeout: Duration,
        interval: Duration,
    ) -> Instant {
        match self {
            Self::Fixed => instant_after(issued_at, timeout),
            Self::Linear => instant_after(
                worker_start,
                timeout.saturating_add(interval.saturating_mul(saturating_u32(index))),
            ),
        }
    }

    /// Worst-case time for a worker to issue `call_num` calls, each paced by
    /// `interval`. Past this the orchestrator stops waiting for the worker.
    pub fn worker_budget(self, call_num: usize, timeout: Duration, interval: Duration) -> Duration {
        let calls = saturating_u32(call_num);
        match self {
            Self::Fixed => timeout
                .saturating_add(interval)
                .saturating_mul(calls)
                .saturating_add(timeout),
            Self::Linear => interval
                .saturating_mul(calls)
                .saturating_add(timeout.saturating_mul(2)),
        }
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// One cancellation token per call of a worker.
///
/// [`DeadlineSet::arm`] ties a token to its call's deadline: the token is
/// cancelled when the deadline passes, and a call waits on its token alone.
/// [`DeadlineSet::release`] cancels every token, which also stops the timers
/// of calls that finished early. Only the first release does anything.
#[derive(Debug)]
pub struct DeadlineSet {
    tokens: Vec<CancellationToken>,
    released: AtomicBool,
}

impl DeadlineSet {
    pub fn new(call_num: usize) -> Self {
        Self {
            tokens: (0..call_num).map(|_| CancellationToken::new()).collect(),
            released: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CancellationToken> {
        self.tokens.iter()
    }

    /// Starts the timer that cancels token `index` at `deadline`.
    ///
    /// The timer ends early once the token is cancelled for any other reason.
    /// Returns `None` if the set has no such token.
    pub fn arm(&self, index: usize, deadline: Instant) -> Option<CancellationToken> {
        let token = self.tokens.get(index)?.clone();
        let timer = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = timer.cancelled() => {}
                () = sleep_until(deadline) => timer.cancel(),
            }
        });
        Some(token)
    }

    /// Cancels every token. Returns `false` if the set was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        for token in &self.tokens {
            token.cancel();
        }
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);
    const INTERVAL: Duration = Duration::from_millis(100);

    #[test]
    fn fixed_deadline_counts_from_issue_time() {
        let start = Instant::now();
        let issued = start + Duration::from_secs(7);

        let deadline = DeadlinePolicy::Fixed.deadline(start, issued, 42, TIMEOUT, INTERVAL);
        assert_eq!(deadline, issued + TIMEOUT);
    }

    #[test]
    fn linear_deadline_grows_with_call_index() {
        let start = Instant::now();
        let issued = start + Duration::from_secs(7);

        for (index, expected_ms) in [(0, 500), (1, 600), (4, 900)] {
            let deadline = DeadlinePolicy::Linear.deadline(start, issued, index, TIMEOUT, INTERVAL);
            assert_eq!(deadline, start + Duration::from_millis(expected_ms));
        }
    }

    #[test]
    fn worker_budget_covers_every_call() {
        assert_eq!(
            DeadlinePolicy::Fixed.worker_budget(3, TIMEOUT, INTERVAL),
            Duration::from_millis(3 * 600 + 500)
        );
        assert_eq!(
            DeadlinePolicy::Linear.worker_budget(3, TIMEOUT, INTERVAL),
            Duration::from_millis(3 * 100 + 1000)
        );
        assert_eq!(
            DeadlinePolicy::Fixed.worker_budget(usize::MAX, Duration::MAX, INTERVAL),
            Duration::MAX
        );
    }

    #[test]
    fn deadlines_are_capped_far_in_the_future() {
        let start = Instant::now();
        let huge = Duration::from_millis(u64::MAX);

        let fixed = DeadlinePolicy::Fixed.deadline(start, start, 0, huge, INTERVAL);
        let linear = DeadlinePolicy::Linear.deadline(start, start, usize::MAX, huge, Duration::MAX);
        assert_eq!(fixed, start + FAR_FUTURE);
        assert_eq!(linear, start + FAR_FUTURE);

        let budget = DeadlinePolicy::Fixed.worker_budget(100_000, huge, INTERVAL);
        assert_eq!(instant_after(start, budget), start + FAR_FUTURE);
    }

    #[tokio::test]
    async fn armed_token_expires_at_its_deadline() {
        let set = DeadlineSet::new(2);

        let expiring = set.arm(0, Instant::now() + Duration::from_millis(20)).unwrap();
        let distant = set.arm(1, Instant::now() + Duration::from_secs(60)).unwrap();
        assert!(set.arm(2, Instant::now()).is_none());

        tokio::time::timeout(Duration::from_secs(5), expiring.cancelled())
            .await
            .unwrap();
        assert!(!distant.is_cancelled());
        assert!(!set.is_released());

        assert!(set.release());
        assert!(distant.is_cancelled());
    }

    #[test]
    fn release_cancels_every_token_once() {
        let set = DeadlineSet::new(4);
        assert_eq!(set.len(), 4);
        assert!(set.iter().all(|token| !token.is_cancelled()));

        assert!(set.release());
        assert!(set.is_released());
        assert!(set.iter().all(CancellationToken::is_cancelled));

        assert!(!set.release());
    }
}
