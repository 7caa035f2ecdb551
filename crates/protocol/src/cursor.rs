//! Coarse, time-derived read cursor (spec §4.3).
//!
//! The cursor is not an offset — it exists purely so a shared CDN can
//! coalesce concurrent long-poll/SSE requests to the same URL. Deterministic
//! by design (an earlier "jitter" variant is dead per spec §9 Open
//! Questions).

/// 2024-10-09T00:00:00Z, as Unix seconds.
pub const CURSOR_EPOCH_UNIX_SECONDS: i64 = 1_728_432_000;

/// Width of one cursor interval.
pub const CURSOR_INTERVAL_SECONDS: i64 = 20;

/// `floor((now - epoch) / interval)`. Negative results (server clock behind
/// the cursor epoch) clamp to 0 rather than going negative.
pub fn current_interval(now_unix_seconds: i64) -> i64 {
    ((now_unix_seconds - CURSOR_EPOCH_UNIX_SECONDS) / CURSOR_INTERVAL_SECONDS).max(0)
}

/// Computes the cursor value to hand back to the client given its previous
/// cursor (if any) and the interval derived from the current wall clock.
///
/// - No client cursor: return `current_interval`.
/// - `client_cursor < current_interval`: return `current_interval`.
/// - `client_cursor >= current_interval`: return `current_interval + 1`
///   (deterministically one step ahead so a client that raced ahead of the
///   server's clock still converges).
pub fn generate_response_cursor(client_cursor: Option<i64>, current_interval: i64) -> i64 {
    match client_cursor {
        None => current_interval,
        Some(c) if c < current_interval => current_interval,
        Some(_) => current_interval + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_client_cursor_returns_current_interval() {
        assert_eq!(generate_response_cursor(None, 42), 42);
    }

    #[test]
    fn stale_client_cursor_returns_current_interval() {
        assert_eq!(generate_response_cursor(Some(10), 42), 42);
    }

    #[test]
    fn client_cursor_at_or_ahead_of_current_returns_one_ahead() {
        assert_eq!(generate_response_cursor(Some(42), 42), 43);
        assert_eq!(generate_response_cursor(Some(100), 42), 43);
    }

    #[test]
    fn is_deterministic_for_any_cursor_at_or_past_current_interval() {
        let current = 42;
        let a = generate_response_cursor(Some(current), current);
        let b = generate_response_cursor(Some(current + 500), current);
        assert_eq!(a, b);
    }

    #[test]
    fn current_interval_is_monotonic_with_wall_clock() {
        let t0 = CURSOR_EPOCH_UNIX_SECONDS;
        assert_eq!(current_interval(t0), 0);
        assert_eq!(current_interval(t0 + 19), 0);
        assert_eq!(current_interval(t0 + 20), 1);
        assert_eq!(current_interval(t0 + 39), 1);
        assert_eq!(current_interval(t0 + 40), 2);
    }

    #[test]
    fn current_interval_clamps_before_epoch() {
        assert_eq!(current_interval(CURSOR_EPOCH_UNIX_SECONDS - 1000), 0);
    }
}
