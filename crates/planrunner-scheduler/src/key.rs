//! Occurrence identity: idempotency keys and the lock tokens derived from them.
//!
//! Every runner must compute the same key and token for the same plan and
//! minute, so nothing here may depend on local state, zone or process.

use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};

/// Fixed-width minute stamp: `YYYYMMDDTHHMM`.
const KEY_INSTANT_FORMAT: &str = "%Y%m%dT%H%M";

/// Floor an instant to the start of its UTC minute.
pub fn truncate_to_minute<Tz: TimeZone>(instant: &DateTime<Tz>) -> DateTime<Utc> {
    let utc = instant.with_timezone(&Utc);
    let secs = utc.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(60), 0)
        .single()
        .unwrap_or(utc)
}

/// `plan_id|YYYYMMDDTHHMM`, using the minute-truncated UTC instant.
pub fn derive_key<Tz: TimeZone>(plan_id: &str, instant: &DateTime<Tz>) -> String {
    let minute = truncate_to_minute(instant);
    format!("{}|{}", plan_id, minute.format(KEY_INSTANT_FORMAT))
}

/// First 8 bytes of SHA-256(key), big-endian, reinterpreted as signed.
pub fn derive_token(key: &str) -> i64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) as i64
}

/// One logical occurrence of a plan: everything the coordinator needs to
/// deduplicate and exclude it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub plan_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub idempotency_key: String,
    pub lock_token: i64,
}

impl Occurrence {
    pub fn new<Tz: TimeZone>(plan_id: &str, instant: &DateTime<Tz>) -> Self {
        let scheduled_at = truncate_to_minute(instant);
        let idempotency_key = derive_key(plan_id, &scheduled_at);
        let lock_token = derive_token(&idempotency_key);
        Self {
            plan_id: plan_id.to_string(),
            scheduled_at,
            idempotency_key,
            lock_token,
        }
    }
}
