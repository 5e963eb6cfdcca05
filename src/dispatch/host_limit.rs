//! Per-host connection slots.
//!
//! Each host gets its own semaphore with `limit` permits, created on first
//! use. A resolution holds one permit for the whole fetch; tasks aimed at a
//! busy host simply wait for a slot.

use crate::utils::maintain_netloc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug)]
pub struct HostLimiter {
    limit: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait for a slot on the host of `url`. Semaphores are never closed, so
    /// this only returns `None` if that ever changes.
    pub async fn acquire(&self, url: &str) -> Option<OwnedSemaphorePermit> {
        let host = maintain_netloc(url).to_lowercase();
        let semaphore = {
            let mut hosts = self.hosts.lock().await;
            hosts
                .entry(host.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(self.limit)))
                .clone()
        };
        let permit = semaphore.clone().acquire_owned().await.ok();
        debug!(%host, available = semaphore.available_permits(), "Host slot acquired");
        permit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_limit_is_per_host() {
        let limiter = HostLimiter::new(2);
        let _a1 = limiter.acquire("https://a.example/1").await;
        let _a2 = limiter.acquire("https://a.example/2").await;

        // a third slot on a.example is not available
        let blocked = timeout(WAIT, limiter.acquire("https://a.example/3")).await;
        assert!(blocked.is_err());

        // other hosts are unaffected
        let other = timeout(WAIT, limiter.acquire("https://b.example/1")).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_released_permit_frees_slot() {
        let limiter = HostLimiter::new(1);
        let first = limiter.acquire("https://a.example/1").await;
        drop(first);
        let second = timeout(WAIT, limiter.acquire("https://a.example/2")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let limiter = Arc::new(HostLimiter::new(2));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let limiter = limiter.clone();
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let _permit = limiter.acquire(&format!("https://busy.example/{i}")).await;
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_limit_is_raised_to_one() {
        assert_eq!(HostLimiter::new(0).limit(), 1);
    }
}
