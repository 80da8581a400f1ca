//! Idempotency keys and the clock they are bucketed by.
//!
//! A key identifies one (directive, capability, session, phase, time bucket)
//! execution attempt:
//!
//! ```text
//! idem_ + hex(sha256("{directive}|{code}|{session or none}|{phase or default}|{bucket}"))[..32]
//! ```
//!
//! where `bucket = floor(unix_millis / window_millis)`. Two requests in the
//! same window share a key; requests either side of a window boundary do not.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use std::time::Duration;

use crate::phase::Phase;

pub const KEY_PREFIX: &str = "idem_";

/// Hex characters of the digest kept in the key.
pub const KEY_HASH_LEN: usize = 32;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Time bucket `now` falls into for a window of `window`.
pub fn time_bucket(now: DateTime<Utc>, window: Duration) -> i64 {
    let window_ms = (window.as_millis() as i64).max(1);
    now.timestamp_millis().div_euclid(window_ms)
}

/// Deterministic key for one execution attempt.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use phasegate::execution::idempotency::{idempotency_key, DEFAULT_WINDOW};
/// use phasegate::phase::Phase;
///
/// let t = Utc.with_ymd_and_hms(2026, 3, 1, 10, 5, 0).unwrap();
/// let later = Utc.with_ymd_and_hms(2026, 3, 1, 10, 55, 0).unwrap();
/// let a = idempotency_key("SD-1", "DATABASE", None, Some(Phase::ExecImpl), t, DEFAULT_WINDOW);
/// let b = idempotency_key("SD-1", "DATABASE", None, Some(Phase::ExecImpl), later, DEFAULT_WINDOW);
/// assert_eq!(a, b);
/// assert!(a.starts_with("idem_"));
/// ```
pub fn idempotency_key(
    directive_id: &str,
    capability_code: &str,
    session_id: Option<&str>,
    phase: Option<Phase>,
    now: DateTime<Utc>,
    window: Duration,
) -> String {
    let raw = format!(
        "{}|{}|{}|{}|{}",
        directive_id,
        capability_code,
        session_id.unwrap_or("none"),
        phase.map(|p| p.as_str()).unwrap_or("default"),
        time_bucket(now, window)
    );
    let digest = hex::encode(Sha256::digest(raw.as_bytes()));
    format!("{}{}", KEY_PREFIX, &digest[..KEY_HASH_LEN])
}
