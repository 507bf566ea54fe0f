//! Warning records.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

static WARN_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// One warning issued to a guild member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warn {
    /// Unique id, shown to moderators.
    pub warn_id: String,
    pub guild_id: u64,
    pub warned_id: u64,
    /// Moderator who issued the warning
    pub author_id: u64,
    pub reason: String,
    /// Unix timestamp in milliseconds when warning was issued
    pub moment: i64,
}

impl Warn {
    /// Create a warning issued now. A blank reason is stored as `/`.
    pub fn new(guild_id: u64, warned_id: u64, author_id: u64, reason: impl Into<String>) -> Self {
        let moment = chrono::Utc::now().timestamp_millis();
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            "/".to_string()
        } else {
            reason.trim().to_string()
        };

        Self {
            warn_id: next_warn_id(moment),
            guild_id,
            warned_id,
            author_id,
            reason,
            moment,
        }
    }
}

fn next_warn_id(moment: i64) -> String {
    let seq = WARN_SEQUENCE.fetch_add(1, Ordering::Relaxed) % 1296;
    format!("{}{:0>2}", to_base36(moment as u64), to_base36(seq as u64))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_reason_becomes_slash() {
        let warn = Warn::new(1, 2, 3, "   ");
        assert_eq!(warn.reason, "/");
    }

    #[test]
    fn test_ids_are_unique_within_a_moment() {
        let a = Warn::new(1, 2, 3, "spam");
        let b = Warn::new(1, 2, 3, "spam");
        assert_ne!(a.warn_id, b.warn_id);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
