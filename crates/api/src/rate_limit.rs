//! Per-IP rate limiting.
//!
//! Each client IP gets a sliding request window plus caps on in-flight
//! requests and open WebSocket sessions. Slots are held by RAII guards so
//! an early return or a dropped connection always releases them.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    pub window: Duration,
    /// In-flight HTTP requests per IP.
    pub max_concurrent: u32,
    /// Request body cap in bytes.
    pub max_body_size: usize,
    /// Open WebSocket sessions per IP.
    pub max_websocket_per_ip: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            max_concurrent: 50,
            max_body_size: 1024 * 1024,
            max_websocket_per_ip: 10,
        }
    }
}

#[derive(Debug, Default)]
struct ClientSlots {
    recent: VecDeque<Instant>,
    in_flight: u32,
    websockets: u32,
}

impl ClientSlots {
    fn expire(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.recent.front() {
            if now.duration_since(*oldest) < window {
                break;
            }
            self.recent.pop_front();
        }
    }

    fn is_idle(&self) -> bool {
        self.recent.is_empty() && self.in_flight == 0 && self.websockets == 0
    }
}

#[derive(Debug)]
struct LimiterState {
    clients: HashMap<IpAddr, ClientSlots>,
    last_cleanup: Instant,
}

/// Thread-safe sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState {
                clients: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// Record a request from `ip`. Returns `false` when the window is full.
    pub fn check_request(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        if now.duration_since(state.last_cleanup) > CLEANUP_INTERVAL {
            let window = self.config.window;
            state.clients.retain(|_, slots| {
                slots.expire(now, window);
                !slots.is_idle()
            });
            state.last_cleanup = now;
        }

        let slots = state.clients.entry(ip).or_default();
        slots.expire(now, self.config.window);
        if slots.recent.len() >= self.config.max_requests as usize {
            return false;
        }
        slots.recent.push_back(now);
        true
    }

    fn acquire(&self, ip: IpAddr, slot: fn(&mut ClientSlots) -> &mut u32, max: u32) -> bool {
        let mut state = self.state.lock();
        let counter = slot(state.clients.entry(ip).or_default());
        if *counter >= max {
            return false;
        }
        *counter += 1;
        true
    }

    fn release(&self, ip: IpAddr, slot: fn(&mut ClientSlots) -> &mut u32) {
        let mut state = self.state.lock();
        if let Some(slots) = state.clients.get_mut(&ip) {
            let counter = slot(slots);
            *counter = counter.saturating_sub(1);
        }
    }

    pub fn acquire_concurrent(&self, ip: IpAddr) -> bool {
        self.acquire(ip, |s| &mut s.in_flight, self.config.max_concurrent)
    }

    pub fn release_concurrent(&self, ip: IpAddr) {
        self.release(ip, |s| &mut s.in_flight)
    }

    pub fn acquire_websocket(&self, ip: IpAddr) -> bool {
        self.acquire(ip, |s| &mut s.websockets, self.config.max_websocket_per_ip)
    }

    pub fn release_websocket(&self, ip: IpAddr) {
        self.release(ip, |s| &mut s.websockets)
    }

    pub fn max_body_size(&self) -> usize {
        self.config.max_body_size
    }

    pub fn stats(&self) -> RateLimitStats {
        let state = self.state.lock();
        RateLimitStats {
            tracked_ips: state.clients.len(),
            in_flight: state.clients.values().map(|s| s.in_flight).sum(),
            websockets: state.clients.values().map(|s| s.websockets).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub tracked_ips: usize,
    pub in_flight: u32,
    pub websockets: u32,
}

/// Holds one in-flight request slot until dropped.
pub struct ConcurrentGuard {
    limiter: Arc<RateLimiter>,
    ip: IpAddr,
}

impl ConcurrentGuard {
    pub fn new(limiter: Arc<RateLimiter>, ip: IpAddr) -> Option<Self> {
        limiter
            .acquire_concurrent(ip)
            .then(|| Self { limiter, ip })
    }
}

impl Drop for ConcurrentGuard {
    fn drop(&mut self) {
        self.limiter.release_concurrent(self.ip);
    }
}

/// Holds one WebSocket slot for the life of the session.
pub struct WebSocketGuard {
    limiter: Arc<RateLimiter>,
    ip: IpAddr,
}

impl WebSocketGuard {
    pub fn new(limiter: Arc<RateLimiter>, ip: IpAddr) -> Option<Self> {
        limiter
            .acquire_websocket(ip)
            .then(|| Self { limiter, ip })
    }
}

impl Drop for WebSocketGuard {
    fn drop(&mut self) {
        self.limiter.release_websocket(self.ip);
    }
}

fn too_many(message: &str) -> Response {
    ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message).into_response()
}

/// Middleware applying the request window and the in-flight cap.
pub async fn enforce_rate_limit(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();

    if !state.rate_limiter.check_request(ip) {
        warn!(%ip, path = %request.uri().path(), "Rate limit exceeded");
        return too_many("Too many requests");
    }

    let Some(_guard) = ConcurrentGuard::new(state.rate_limiter.clone(), ip) else {
        warn!(%ip, "Concurrent request limit exceeded");
        return too_many("Too many concurrent requests");
    };

    debug!(%ip, path = %request.uri().path(), "Request admitted");
    next.run(request).await
}
