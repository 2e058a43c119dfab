use crate::config::RateLimitConfig;
use axum::http::HeaderMap;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::warn;

/// Sliding-window limiter keyed by client address, with independent
/// per-minute and per-hour windows.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: DashMap<String, ClientWindow>,
}

#[derive(Default)]
struct ClientWindow {
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
}

/// Verdict for one request, carried into the response headers.
#[derive(Debug, Clone)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    pub retry_after_seconds: Option<u64>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: DashMap::new(),
        }
    }

    pub fn check(&self, client_key: &str) -> RateDecision {
        self.check_at(client_key, Instant::now())
    }

    fn check_at(&self, client_key: &str, now: Instant) -> RateDecision {
        let mut entry = self.clients.entry(client_key.to_string()).or_default();

        prune(&mut entry.minute, now, Duration::from_secs(60));
        prune(&mut entry.hour, now, Duration::from_secs(3600));

        let minute_count = entry.minute.len();
        let hour_count = entry.hour.len();
        let limit = self.config.requests_per_minute;
        let remaining = limit.saturating_sub(minute_count);

        if minute_count >= limit {
            warn!("Rate limit (minute) hit for {}", client_key);
            return RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                retry_after_seconds: Some(60),
            };
        }

        if hour_count >= self.config.requests_per_hour {
            warn!("Rate limit (hour) hit for {}", client_key);
            return RateDecision {
                allowed: false,
                limit,
                remaining,
                retry_after_seconds: Some(3600),
            };
        }

        entry.minute.push_back(now);
        entry.hour.push_back(now);

        RateDecision {
            allowed: true,
            limit,
            remaining: remaining.saturating_sub(1),
            retry_after_seconds: None,
        }
    }

    pub fn reset_client(&self, client_key: &str) {
        self.clients.remove(client_key);
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) > span {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Client identity for limiting: proxy headers first, then the peer
/// address.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn limiter(per_minute: usize, per_hour: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_minute: per_minute,
            requests_per_hour: per_hour,
        })
    }

    #[test]
    fn test_requests_under_limit_are_allowed() {
        let limiter = limiter(3, 100);
        let now = Instant::now();

        let first = limiter.check_at("1.2.3.4", now);
        assert!(first.allowed);
        assert_eq!(first.remaining, 2);

        let second = limiter.check_at("1.2.3.4", now);
        assert!(second.allowed);
        assert_eq!(second.remaining, 1);
    }

    #[test]
    fn test_minute_limit_blocks_with_retry_after() {
        let limiter = limiter(2, 100);
        let now = Instant::now();

        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(limiter.check_at("1.2.3.4", now).allowed);

        let blocked = limiter.check_at("1.2.3.4", now);
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        assert_eq!(blocked.retry_after_seconds, Some(60));
    }

    #[test]
    fn test_minute_window_slides() {
        let limiter = limiter(2, 100);
        let now = Instant::now();

        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(!limiter.check_at("1.2.3.4", now).allowed);

        let later = now + Duration::from_secs(61);
        assert!(limiter.check_at("1.2.3.4", later).allowed);
    }

    #[test]
    fn test_hour_limit_survives_minute_expiry() {
        let limiter = limiter(100, 2);
        let now = Instant::now();

        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(limiter.check_at("1.2.3.4", now).allowed);

        let later = now + Duration::from_secs(120);
        let blocked = limiter.check_at("1.2.3.4", later);
        assert!(!blocked.allowed);
        assert_eq!(blocked.retry_after_seconds, Some(3600));
    }

    #[test]
    fn test_clients_are_tracked_independently() {
        let limiter = limiter(1, 100);
        let now = Instant::now();

        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(!limiter.check_at("1.2.3.4", now).allowed);
        assert!(limiter.check_at("5.6.7.8", now).allowed);
    }

    #[test]
    fn test_reset_clears_client_state() {
        let limiter = limiter(1, 100);
        let now = Instant::now();

        assert!(limiter.check_at("1.2.3.4", now).allowed);
        assert!(!limiter.check_at("1.2.3.4", now).allowed);

        limiter.reset_client("1.2.3.4");
        assert!(limiter.check_at("1.2.3.4", now).allowed);
    }

    #[test]
    fn test_client_key_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("9.9.9.9, 10.0.0.1"),
        );
        headers.insert("X-Real-IP", HeaderValue::from_static("8.8.8.8"));

        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(peer)), "9.9.9.9");

        headers.remove("X-Forwarded-For");
        assert_eq!(client_key(&headers, Some(peer)), "8.8.8.8");

        headers.remove("X-Real-IP");
        assert_eq!(client_key(&headers, Some(peer)), "127.0.0.1");
        assert_eq!(client_key(&headers, None), "unknown");
    }
}
