// Queue configuration keys and value interpretation
//
// Values live in the durable config table as JSON. Readers interpret them
// here so every component agrees on defaults and fallbacks.

use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff base (delay = base ^ attempts seconds)
pub const BACKOFF_BASE_KEY: &str = "backoff_base";
/// Default attempt ceiling for jobs enqueued without one
pub const MAX_RETRIES_KEY: &str = "max_retries";
/// Per-job execution deadline in seconds (absent = unbounded)
pub const JOB_TIMEOUT_KEY: &str = "job_timeout";

pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Interpret `backoff_base`; non-numeric or non-positive values fall back to 2
pub fn backoff_base(value: Option<&Value>) -> f64 {
    match value {
        None => DEFAULT_BACKOFF_BASE,
        Some(v) => match as_number(v) {
            Some(base) if base.is_finite() && base > 0.0 => base,
            _ => {
                warn!(value = %v, "Invalid backoff_base, using default");
                DEFAULT_BACKOFF_BASE
            }
        },
    }
}

/// Interpret `max_retries`; must be a positive integer
pub fn max_retries(value: Option<&Value>) -> u32 {
    match value {
        None => super::DEFAULT_MAX_RETRIES,
        Some(v) => match as_number(v) {
            Some(n) if n >= 1.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => n as u32,
            _ => {
                warn!(value = %v, "Invalid max_retries, using default");
                super::DEFAULT_MAX_RETRIES
            }
        },
    }
}

/// Interpret `job_timeout` (seconds); absent or null means no deadline
pub fn job_timeout(value: Option<&Value>) -> Option<Duration> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => match as_number(v) {
            Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
            _ => {
                warn!(value = %v, "Invalid job_timeout, running without deadline");
                None
            }
        },
    }
}

// `config set` falls back to storing strings, so "3" must still count
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backoff_base_defaults_and_fallbacks() {
        assert_eq!(backoff_base(None), 2.0);
        assert_eq!(backoff_base(Some(&json!(3))), 3.0);
        assert_eq!(backoff_base(Some(&json!(1.5))), 1.5);
        assert_eq!(backoff_base(Some(&json!("4"))), 4.0);
        assert_eq!(backoff_base(Some(&json!(-1))), 2.0);
        assert_eq!(backoff_base(Some(&json!({"x": 1}))), 2.0);
    }

    #[test]
    fn test_max_retries_requires_positive_integer() {
        assert_eq!(max_retries(None), 3);
        assert_eq!(max_retries(Some(&json!(5))), 5);
        assert_eq!(max_retries(Some(&json!(0))), 3);
        assert_eq!(max_retries(Some(&json!(2.5))), 3);
    }

    #[test]
    fn test_job_timeout() {
        assert_eq!(job_timeout(None), None);
        assert_eq!(job_timeout(Some(&Value::Null)), None);
        assert_eq!(job_timeout(Some(&json!(2))), Some(Duration::from_secs(2)));
        assert_eq!(job_timeout(Some(&json!(0))), None);
    }
}
