use std::time::Duration;

use tokio::time::sleep as tokio_sleep;
use uuid::Uuid;

#[cfg(test)]
const BASE_DELAY_MS: u64 = 5;
#[cfg(not(test))]
const BASE_DELAY_MS: u64 = 250;

#[cfg(test)]
const MAX_DELAY_MS: u64 = 50;
#[cfg(not(test))]
const MAX_DELAY_MS: u64 = 5_000;

/// Delay before retry `attempt` (zero based): capped exponential step, the upper half of it
/// randomized.
pub fn delay(attempt: u32) -> Duration {
    let pow = attempt.min(16);
    let capped = BASE_DELAY_MS.saturating_mul(1u64 << pow).min(MAX_DELAY_MS);
    let half = capped / 2;
    let jitter = if half == 0 {
        0
    } else {
        (Uuid::new_v4().as_u128() % u128::from(half)) as u64
    };
    Duration::from_millis(capped - half + jitter)
}

pub async fn sleep(attempt: u32) {
    tokio_sleep(delay(attempt)).await;
}
