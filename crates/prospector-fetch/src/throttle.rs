//! Global and per-host concurrency limits with request spacing.

use crate::error::{FetchError, Result};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Spacing multiplier while a host is penalized.
pub const PENALTY_FACTOR: u32 = 4;

/// Hosts untouched for this long are forgotten.
pub const HOST_IDLE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct HostState {
    permits: Arc<Semaphore>,
    next_slot: Instant,
    penalized_until: Option<Instant>,
    last_used: Instant,
}

impl HostState {
    /// Idle past `idle` with no permit held or awaited and no pending
    /// spacing or penalty.
    fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        Arc::strong_count(&self.permits) == 1
            && now.duration_since(self.last_used) >= idle
            && self.next_slot <= now
            && self.penalized_until.map_or(true, |until| until <= now)
    }
}

#[derive(Debug)]
struct Hosts {
    states: HashMap<String, HostState>,
    swept_at: Instant,
}

/// Held for the duration of one fetch; releases both slots on drop.
#[derive(Debug)]
pub struct ThrottlePermit {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

/// Concurrency and pacing limits shared by every fetch.
#[derive(Debug)]
pub struct HostThrottle {
    global: Arc<Semaphore>,
    per_host_max: usize,
    min_delay: Duration,
    jitter_ms: u64,
    penalty: Duration,
    hosts: Mutex<Hosts>,
}

impl HostThrottle {
    /// Create a throttle.
    #[must_use]
    pub fn new(
        max_concurrent: usize,
        per_host_max: usize,
        min_delay: Duration,
        jitter_ms: u64,
        penalty: Duration,
    ) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrent.max(1))),
            per_host_max: per_host_max.max(1),
            min_delay,
            jitter_ms,
            penalty,
            hosts: Mutex::new(Hosts {
                states: HashMap::new(),
                swept_at: Instant::now(),
            }),
        }
    }

    fn with_host<T>(&self, host: &str, f: impl FnOnce(&mut HostState) -> T) -> T {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if now.duration_since(hosts.swept_at) >= HOST_IDLE_TTL {
            hosts.swept_at = now;
            hosts.states.retain(|_, s| !s.is_idle(now, HOST_IDLE_TTL));
        }
        let state = hosts.states.entry(host.to_string()).or_insert_with(|| HostState {
            permits: Arc::new(Semaphore::new(self.per_host_max)),
            next_slot: now,
            penalized_until: None,
            last_used: now,
        });
        state.last_used = now;
        f(state)
    }

    /// Forget hosts idle for at least `idle`. Returns how many were dropped.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let before = hosts.states.len();
        hosts.states.retain(|_, s| !s.is_idle(now, idle));
        hosts.swept_at = now;
        before - hosts.states.len()
    }

    /// Number of hosts with tracked state.
    #[must_use]
    pub fn tracked_hosts(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .len()
    }

    /// Wait for a per-host slot, then a global slot.
    ///
    /// The host slot comes first so a busy host doesn't pin global capacity.
    pub async fn acquire(&self, host: &str) -> Result<ThrottlePermit> {
        let host_permits = self.with_host(host, |s| Arc::clone(&s.permits));
        let host_permit = host_permits
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Closed)?;
        let global_permit = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Closed)?;
        Ok(ThrottlePermit {
            _host: host_permit,
            _global: global_permit,
        })
    }

    /// Sleep until this host's next request slot.
    pub async fn pace(&self, host: &str) {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        let wait = self.with_host(host, |state| {
            let now = Instant::now();
            let penalized = state.penalized_until.is_some_and(|until| until > now);
            let factor = if penalized { PENALTY_FACTOR } else { 1 };
            let spacing = self.min_delay * factor + Duration::from_millis(jitter);
            let slot = state.next_slot.max(now);
            state.next_slot = slot + spacing;
            slot - now
        });
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Put a host into the reduced-throughput state.
    pub fn penalize(&self, host: &str) {
        let until = Instant::now() + self.penalty;
        self.with_host(host, |state| state.penalized_until = Some(until));
        debug!(host, secs = self.penalty.as_secs(), "host penalized");
    }

    /// Whether a host is currently penalized.
    #[must_use]
    pub fn is_penalized(&self, host: &str) -> bool {
        let now = Instant::now();
        self.with_host(host, |state| state.penalized_until.is_some_and(|until| until > now))
    }

    /// Free global slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.global.available_permits()
    }
}
