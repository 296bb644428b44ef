use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::domain::UserId;

// ============== Authorization ==============

/// An empty allowlist means the bot is public.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    allowed_users.is_empty() || allowed_users.contains(&user_id.0)
}

// ============== Rate Limiter (Token Bucket) ==============

#[derive(Clone, Debug)]
struct Bucket {
    tokens: f64,
    last_update: Instant,
}

#[derive(Clone, Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_tokens: f64,
    refill_per_sec: f64,
    /// Time for an empty bucket to refill; idle that long, a bucket is dropped.
    window: Duration,
    last_prune: Option<Instant>,
    buckets: HashMap<UserId, Bucket>,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_tokens: u32, window: Duration) -> Self {
        let max_tokens_f = f64::from(max_tokens);
        let window_secs = window.as_secs_f64().max(1e-9);

        Self {
            enabled,
            max_tokens: max_tokens_f,
            refill_per_sec: max_tokens_f / window_secs,
            window,
            last_prune: None,
            buckets: HashMap::new(),
        }
    }

    /// Take one token. On refusal, returns how long until the next token.
    pub fn check(&mut self, user_id: UserId) -> (bool, Option<Duration>) {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&mut self, user_id: UserId, now: Instant) -> (bool, Option<Duration>) {
        if !self.enabled {
            return (true, None);
        }
        if self.refill_per_sec <= 0.0 {
            return (false, None);
        }

        self.prune_idle(now);

        let bucket = self.buckets.entry(user_id).or_insert_with(|| Bucket {
            tokens: self.max_tokens,
            last_update: now,
        });

        let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return (true, None);
        }

        let secs = (1.0 - bucket.tokens) / self.refill_per_sec;
        (false, Some(Duration::from_secs_f64(secs.max(0.0))))
    }

    /// At most once per window, forget buckets that have refilled completely.
    fn prune_idle(&mut self, now: Instant) {
        let due = self
            .last_prune
            .map_or(true, |t| now.duration_since(t) >= self.window);
        if !due {
            return;
        }
        let window = self.window;
        self.buckets
            .retain(|_, b| now.duration_since(b.last_update) < window);
        self.last_prune = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allowlist_is_public() {
        assert!(is_authorized(Some(UserId(7)), &[]));
        assert!(!is_authorized(None, &[]));
    }

    #[test]
    fn allowlist_is_enforced() {
        assert!(is_authorized(Some(UserId(7)), &[1, 7]));
        assert!(!is_authorized(Some(UserId(8)), &[1, 7]));
    }

    #[test]
    fn rate_limiter_basic_refill() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 2, Duration::from_secs(10));
        let u = UserId(1);

        assert!(rl.check_at(u, start).0);
        assert!(rl.check_at(u, start).0);
        let (ok, retry) = rl.check_at(u, start);
        assert!(!ok);
        assert!(retry.unwrap() <= Duration::from_secs(5));

        // 2 tokens / 10s: one token back after 5 seconds.
        let (ok, _) = rl.check_at(u, start + Duration::from_secs(5));
        assert!(ok);
    }

    #[test]
    fn rate_limiter_is_per_user() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 1, Duration::from_secs(60));
        assert!(rl.check_at(UserId(1), start).0);
        assert!(!rl.check_at(UserId(1), start).0);
        assert!(rl.check_at(UserId(2), start).0);
    }

    #[test]
    fn idle_buckets_are_pruned() {
        let start = Instant::now();
        let mut rl = RateLimiter::new(true, 1, Duration::from_secs(60));
        assert!(rl.check_at(UserId(1), start).0);
        assert!(rl.check_at(UserId(2), start + Duration::from_secs(30)).0);
        assert_eq!(rl.buckets.len(), 2);

        // User 1 idle for a full window is forgotten; user 2 is not yet.
        assert!(rl.check_at(UserId(3), start + Duration::from_secs(61)).0);
        let mut users: Vec<i64> = rl.buckets.keys().map(|u| u.0).collect();
        users.sort();
        assert_eq!(users, vec![2, 3]);

        // A forgotten user starts again with a full bucket.
        assert!(rl.check_at(UserId(1), start + Duration::from_secs(62)).0);
    }

    #[test]
    fn disabled_rate_limiter_always_allows() {
        let mut rl = RateLimiter::new(false, 0, Duration::from_secs(60));
        for _ in 0..100 {
            assert_eq!(rl.check(UserId(1)), (true, None));
        }
    }
}
