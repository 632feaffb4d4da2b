use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Outcome of a rate-limit check: either the request proceeds, or it is
/// denied with the number of seconds the client should wait before retrying.
pub enum RateLimitDecision {
    Allow,
    Deny { retry_after_seconds: u64 },
}

struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Per-IP fixed-window rate limiter.
///
/// Unlike a sliding window, a bucket's count resets to zero the moment its
/// window elapses rather than decaying continuously — simpler and sufficient
/// for a per-IP admission gate. A background task periodically evicts
/// buckets whose window has already elapsed, bounding memory growth.
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    window: Duration,
    max_requests: u32,
    rejections: Arc<AtomicU64>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
            rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cumulative count of denied requests since startup, for `/health`.
    pub fn rejection_count(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Spawn the periodic bucket-eviction task. Call once per limiter instance.
    pub fn spawn_cleanup(&self) {
        let buckets = Arc::clone(&self.buckets);
        let window = self.window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut map = buckets.lock().await;
                map.retain(|_, bucket| bucket.reset_at > now);
            }
        });
    }

    /// Check and, if allowed, record one request from `client_key`.
    pub async fn check(&self, client_key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;

        let bucket = buckets.entry(client_key.to_string()).or_insert(Bucket {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + self.window;
        }

        if bucket.count >= self.max_requests {
            let retry_after_seconds = bucket.reset_at.saturating_duration_since(now).as_secs_f64();
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return RateLimitDecision::Deny {
                retry_after_seconds: retry_after_seconds.ceil() as u64,
            };
        }

        bucket.count += 1;
        RateLimitDecision::Allow
    }
}

/// Extract the client identity for rate limiting: the first entry of
/// `X-Forwarded-For` if present, else the socket's remote address.
pub fn client_key(forwarded_for: Option<&str>, remote_addr: &str) -> String {
    forwarded_for
        .and_then(|h| h.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| remote_addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_the_limit_then_denies() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        for _ in 0..3 {
            assert!(matches!(
                limiter.check("1.2.3.4").await,
                RateLimitDecision::Allow
            ));
        }
        match limiter.check("1.2.3.4").await {
            RateLimitDecision::Deny {
                retry_after_seconds,
            } => assert!(retry_after_seconds <= 60),
            RateLimitDecision::Allow => panic!("expected denial past the limit"),
        }
        assert_eq!(limiter.rejection_count(), 1);
    }

    #[tokio::test]
    async fn separate_keys_do_not_share_a_bucket() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        assert!(matches!(
            limiter.check("1.1.1.1").await,
            RateLimitDecision::Allow
        ));
        assert!(matches!(
            limiter.check("2.2.2.2").await,
            RateLimitDecision::Allow
        ));
    }

    #[test]
    fn client_key_prefers_forwarded_for_first_entry() {
        assert_eq!(
            client_key(Some("10.0.0.1, 10.0.0.2"), "127.0.0.1"),
            "10.0.0.1"
        );
        assert_eq!(client_key(None, "127.0.0.1"), "127.0.0.1");
        assert_eq!(client_key(Some(""), "127.0.0.1"), "127.0.0.1");
    }
}
