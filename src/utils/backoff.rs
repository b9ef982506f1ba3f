use std::time::Duration;

// ============================================================================
// Exponential Backoff
// ============================================================================
//
// Pacing for transient stream failures. The consumer loop asks for the next
// delay after every failed fetch and resets once a fetch succeeds, so an
// outage backs off geometrically while a single hiccup costs one short
// pause.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Ceiling the delay saturates at.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Mutable backoff state built from a [`BackoffPolicy`].
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    next: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let next = policy.initial_delay;
        Self { policy, next }
    }

    /// Returns the delay to sleep for and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let grown = Duration::from_millis(
            (self.next.as_millis() as f64 * self.policy.multiplier) as u64,
        );
        self.next = grown.min(self.policy.max_delay);
        delay
    }

    /// Back to the initial delay after a success.
    pub fn reset(&mut self) {
        self.next = self.policy.initial_delay;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
