use std::time::Duration;

use moor_common::config;

#[derive(Debug, Clone)]
pub enum RetryStrategy {
    Fixed {
        delay: Duration,
    },
    ExponentialBackoff {
        initial_delay: Duration,
        max_delay: Duration,
        factor: u32,
    },
}

impl RetryStrategy {
    /// The delay to wait after the given zero-based attempt.
    /// The strategy never gives up; callers that want a bounded number of
    /// attempts are expected to stop re-arming the retry themselves.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                factor,
            } => {
                let mut delay = *initial_delay;
                for _ in 0..attempt {
                    delay = std::cmp::min(delay.saturating_mul(*factor), *max_delay);
                    if delay >= *max_delay {
                        break;
                    }
                }
                delay
            }
        }
    }
}

impl From<&config::RetryStrategy> for RetryStrategy {
    fn from(config: &config::RetryStrategy) -> Self {
        match config {
            config::RetryStrategy::Fixed { delay_secs } => Self::Fixed {
                delay: Duration::from_secs(*delay_secs),
            },
            config::RetryStrategy::ExponentialBackoff {
                initial_delay_secs,
                max_delay_secs,
                factor,
            } => Self::ExponentialBackoff {
                initial_delay: Duration::from_secs(*initial_delay_secs),
                max_delay: Duration::from_secs(*max_delay_secs),
                factor: *factor,
            },
        }
    }
}
