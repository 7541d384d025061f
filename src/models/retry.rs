use std::time::Duration;

use anyhow::{Result, anyhow};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_MS: [u64; 3] = [1_000, 2_000, 4_000];

/// Bounded retry schedule for webhook delivery.
///
/// Delays come from a fixed table indexed by attempt number; attempts past
/// the end of the table reuse its last entry. Delivery stops once
/// `max_attempts` attempts have been made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Result<Self> {
        if max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }

        if backoff.is_empty() {
            return Err(anyhow!("Backoff table cannot be empty"));
        }

        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    pub fn from_millis(max_attempts: u32, backoff_ms: &[u64]) -> Result<Self> {
        Self::new(
            max_attempts,
            backoff_ms.iter().copied().map(Duration::from_millis).collect(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_table(&self) -> &[Duration] {
        &self.backoff
    }

    /// Wait before the attempt that follows attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[index]
    }

    pub fn should_give_up(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_attempts_past_table_reuse_last_entry() {
        let policy = RetryPolicy::from_millis(10, &[100, 250]).unwrap();

        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
        assert_eq!(policy.delay_for(9), Duration::from_millis(250));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(250));
    }

    #[test]
    fn test_attempt_zero_uses_first_entry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn test_gives_up_at_ceiling() {
        let policy = RetryPolicy::default();

        assert!(!policy.should_give_up(0));
        assert!(!policy.should_give_up(1));
        assert!(!policy.should_give_up(2));
        assert!(policy.should_give_up(3));
        assert!(policy.should_give_up(4));
    }

    #[test]
    fn test_rejects_degenerate_configuration() {
        assert!(RetryPolicy::from_millis(0, &[1_000]).is_err());
        assert!(RetryPolicy::from_millis(3, &[]).is_err());
    }
}
