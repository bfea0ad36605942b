//! Retry utilities with exponential backoff

use std::time::Duration;

/// Delay before the next attempt: `base * 2^(attempt - 1)`, capped at 30s.
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_delay_ms.saturating_mul(factor).min(30_000))
}

/// Retry a blocking operation with exponential backoff.
///
/// Intended for code already running on a blocking thread (the DuckDB
/// writer); sleeps the current thread between attempts.
///
/// Returns `Ok(attempts)` on success, or `Err((error, attempts))` on failure.
pub fn retry_blocking<F, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<u32, (E, u32)>
where
    F: FnMut() -> Result<(), E>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation() {
            Ok(()) => return Ok(attempts),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err((e, attempts));
                }
                let delay = backoff_delay(base_delay_ms, attempts);
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient error"
                );
                std::thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(100, 40), Duration::from_secs(30));
    }

    #[test]
    fn test_success_on_first_try() {
        let result = retry_blocking(3, 1, || Ok::<(), &str>(()));
        assert_eq!(result, Ok(1));
    }

    #[test]
    fn test_success_after_retry() {
        let mut calls = 0;
        let result = retry_blocking(3, 1, || {
            calls += 1;
            if calls < 2 { Err("transient") } else { Ok(()) }
        });
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn test_failure_after_max_attempts() {
        let (error, attempts) = retry_blocking(3, 1, || Err::<(), _>("persistent")).unwrap_err();
        assert_eq!(error, "persistent");
        assert_eq!(attempts, 3);
    }
}
