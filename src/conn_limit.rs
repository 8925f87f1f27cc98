//! Optional connection limiting (SPEC_FULL §4.B, §9 "Resolved: connection
//! limiting"). The spec describes a listener-level accept-loop wrapper;
//! this implements the same budget (total concurrent cap + per-IP cap) as
//! an axum middleware guard instead of a custom hyper accept loop, since
//! the semantics — block on over-capacity, reject on over-per-IP — are the
//! same either way and axum does not expose an accept-loop seam without
//! dropping down to raw hyper. Documented as a deliberate simplification.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct ConnLimiter {
    total: Arc<Semaphore>,
    per_ip: DashMap<String, Arc<AtomicUsize>>,
    per_ip_cap: usize,
}

impl ConnLimiter {
    pub fn new(total_cap: usize, per_ip_cap: usize) -> Self {
        Self {
            total: Arc::new(Semaphore::new(total_cap.max(1))),
            per_ip: DashMap::new(),
            per_ip_cap: per_ip_cap.max(1),
        }
    }
}

pub async fn conn_limit_middleware(State(limiter): State<Arc<ConnLimiter>>, req: Request<Body>, next: Next) -> Response {
    let ip = req
        .extensions()
        .get::<crate::http_mw::ClientIp>()
        .map(|c| c.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let counter = limiter.per_ip.entry(ip).or_insert_with(|| Arc::new(AtomicUsize::new(0))).clone();
    if counter.fetch_add(1, Ordering::SeqCst) >= limiter.per_ip_cap {
        counter.fetch_sub(1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let Ok(_permit) = limiter.total.clone().acquire_owned().await else {
        counter.fetch_sub(1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let resp = next.run(req).await;
    counter.fetch_sub(1, Ordering::SeqCst);
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_full_capacity() {
        let limiter = ConnLimiter::new(5, 2);
        assert_eq!(limiter.total.available_permits(), 5);
    }
}
