//! Exchange clock helpers
//!
//! All timestamps in the core are Unix nanoseconds as `i64`, stamped by the
//! symbol worker when it executes a command.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix nanoseconds.
pub fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_nanos_monotone_enough() {
        let a = unix_nanos();
        let b = unix_nanos();
        assert!(a > 0);
        assert!(b >= a);
    }
}
