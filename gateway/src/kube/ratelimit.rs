//! Token-bucket gate for apiserver reads
//!
//! Metadata lookups that miss the cache go to the wire. This gate
//! bounds them to the configured QPS with a burst allowance, the same
//! contract the cluster client's own limiter exposes. Cache hits never
//! touch it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// Tokens are scaled so fractional QPS values refill evenly.
const TOKEN_SCALE: u64 = 1000;

/// Async token bucket. `acquire` suspends the caller until a token is
/// available; it never drops work.
pub struct RateGate {
    capacity: u64,
    refill_nanos: u64,
    tokens: AtomicU64,
    last_refill: AtomicU64,
    start: Instant,
}

impl RateGate {
    /// A gate allowing `qps` sustained requests per second with bursts
    /// of up to `burst` requests.
    pub fn new(qps: f32, burst: u32) -> Self {
        let qps = if qps > 0.0 { qps } else { 1.0 };
        let capacity = u64::from(burst.max(1)) * TOKEN_SCALE;
        let refill_nanos = (1_000_000_000f64 / f64::from(qps)) as u64 / TOKEN_SCALE;

        Self {
            capacity,
            refill_nanos: refill_nanos.max(1),
            tokens: AtomicU64::new(capacity),
            last_refill: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            // One full token takes TOKEN_SCALE refill intervals.
            let wait = Duration::from_nanos(self.refill_nanos * TOKEN_SCALE).min(Duration::from_millis(100));
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.refill();

        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current < TOKEN_SCALE {
                return false;
            }
            if self
                .tokens
                .compare_exchange_weak(
                    current,
                    current - TOKEN_SCALE,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    fn refill(&self) {
        let now_nanos = self.start.elapsed().as_nanos() as u64;

        loop {
            let last = self.last_refill.load(Ordering::Acquire);
            let elapsed = now_nanos.saturating_sub(last);
            if elapsed < self.refill_nanos {
                return;
            }

            let intervals = elapsed / self.refill_nanos;
            let new_last = last + intervals * self.refill_nanos;

            match self.last_refill.compare_exchange_weak(
                last,
                new_last,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    loop {
                        let current = self.tokens.load(Ordering::Acquire);
                        let refreshed = current.saturating_add(intervals).min(self.capacity);
                        if current == refreshed {
                            return;
                        }
                        if self
                            .tokens
                            .compare_exchange_weak(
                                current,
                                refreshed,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            return;
                        }
                    }
                }
                Err(_) => continue,
            }
        }
    }
}
