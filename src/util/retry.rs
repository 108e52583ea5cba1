//! Bounded retry with exponential backoff, for remote-tracker calls only.
//!
//! Ported from `weave_gh/cli.py::_run`'s retry loop: base delay 2s, doubling
//! each attempt, capped at 3 retries, and — critically — only triggered when
//! the failure classifies as a rate limit. Any other failure propagates on
//! the first attempt.

use crate::error::{QError, QResult};
use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;
pub const BASE_DELAY: Duration = Duration::from_secs(2);

/// Runs `attempt`, retrying up to [`MAX_RETRIES`] times with doubling
/// backoff when it fails with [`QError::RateLimited`]. `sleep` is injectable
/// so tests can observe the computed delays without actually waiting.
pub fn retry_with_backoff<T>(
    mut attempt: impl FnMut(u32) -> QResult<T>,
    mut sleep: impl FnMut(Duration),
) -> QResult<T> {
    let mut last_err = None;
    for n in 0..=MAX_RETRIES {
        match attempt(n) {
            Ok(value) => return Ok(value),
            Err(QError::RateLimited { retry_after }) if n < MAX_RETRIES => {
                let delay = retry_after.max(BASE_DELAY * 2u32.pow(n));
                sleep(delay);
                last_err = Some(QError::RateLimited { retry_after });
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(QError::HistoryQueryFailure("retry budget exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn stops_retrying_once_rate_limit_clears() {
        let call_count = RefCell::new(0u32);
        let delays = RefCell::new(Vec::new());
        let result = retry_with_backoff(
            |n| {
                *call_count.borrow_mut() += 1;
                if n < 2 {
                    Err(QError::RateLimited {
                        retry_after: Duration::from_secs(1),
                    })
                } else {
                    Ok(42)
                }
            },
            |d| delays.borrow_mut().push(d),
        );
        assert_eq!(result.unwrap(), 42);
        assert_eq!(*call_count.borrow(), 3);
        assert_eq!(delays.borrow().len(), 2);
    }

    #[test]
    fn non_rate_limit_failure_never_retries() {
        let call_count = RefCell::new(0u32);
        let result: QResult<()> = retry_with_backoff(
            |_| {
                *call_count.borrow_mut() += 1;
                Err(QError::PermissionDenied("nope".into()))
            },
            |_| {},
        );
        assert!(matches!(result, Err(QError::PermissionDenied(_))));
        assert_eq!(*call_count.borrow(), 1);
    }

    #[test]
    fn exhausting_retries_returns_last_rate_limit_error() {
        let result: QResult<()> = retry_with_backoff(
            |_| {
                Err(QError::RateLimited {
                    retry_after: Duration::from_secs(1),
                })
            },
            |_| {},
        );
        assert!(matches!(result, Err(QError::RateLimited { .. })));
    }
}
