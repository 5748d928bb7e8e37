//! Host availability tracking.
//!
//! # State Machine
//!
//! ```text
//! Available --[failure_threshold consecutive failures]--> Unavailable
//! Unavailable --[cooldown elapsed]--> Probing (one request allowed)
//! Probing --[success]--> Available
//! Probing --[failure]--> Unavailable (cooldown restarts)
//! Probing --[abandoned]--> Unavailable (next check may try again)
//! Probing --[no answer within cooldown]--> Probing (new trial allowed)
//! ```
//!
//! Any success resets the failure count. Only transport failures are
//! recorded; "no data" answers prove the host is alive. A trial that never
//! reports back holds the host for at most one more cooldown.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;

/// Oracle consulted before a retrieval is queued.
pub trait NetworkStatus: Send + Sync {
    /// True if requests to the host of `url` should not be attempted.
    fn is_host_unavailable(&self, url: &str) -> bool;

    /// Reports a transport failure against the host of `url`.
    fn record_failure(&self, url: &str);

    /// Reports a successful exchange with the host of `url`.
    fn record_success(&self, url: &str);

    /// Reports a request to the host of `url` that ended without an answer
    /// either way, such as a stale or cancelled retrieval.
    fn record_abandoned(&self, _url: &str) {}
}

/// Availability of one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Available,
    Unavailable,
    /// Cooldown elapsed; one trial request is in progress.
    Probing,
}

#[derive(Debug)]
struct HostEntry {
    state: HostState,
    consecutive_failures: u32,
    unavailable_since: Option<Instant>,
    trial_started: Option<Instant>,
}

impl HostEntry {
    fn new() -> Self {
        Self {
            state: HostState::Available,
            consecutive_failures: 0,
            unavailable_since: None,
            trial_started: None,
        }
    }
}

/// Per-host circuit breaker.
#[derive(Debug)]
pub struct HostStatusTracker {
    failure_threshold: u32,
    cooldown: Duration,
    hosts: Mutex<HashMap<String, HostEntry>>,
}

impl HostStatusTracker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.host_failure_threshold, config.host_cooldown)
    }

    /// Current state of the host of `url`.
    pub fn host_state(&self, url: &str) -> HostState {
        host_of(url)
            .and_then(|host| self.hosts.lock().get(&host).map(|e| e.state))
            .unwrap_or(HostState::Available)
    }

    /// Number of hosts currently unavailable or probing.
    pub fn unavailable_hosts(&self) -> usize {
        self.hosts
            .lock()
            .values()
            .filter(|e| e.state != HostState::Available)
            .count()
    }
}

impl NetworkStatus for HostStatusTracker {
    fn is_host_unavailable(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        let mut hosts = self.hosts.lock();
        let Some(entry) = hosts.get_mut(&host) else {
            return false;
        };

        match entry.state {
            HostState::Available => false,
            HostState::Probing => {
                let expired = entry
                    .trial_started
                    .map_or(true, |started| started.elapsed() >= self.cooldown);
                if expired {
                    entry.trial_started = Some(Instant::now());
                    debug!(host = %host, "Trial request never reported back, allowing another");
                    false
                } else {
                    true
                }
            }
            HostState::Unavailable => {
                let cooled = entry
                    .unavailable_since
                    .is_some_and(|since| since.elapsed() >= self.cooldown);
                if cooled {
                    entry.state = HostState::Probing;
                    entry.trial_started = Some(Instant::now());
                    debug!(host = %host, "Host cooldown elapsed, allowing trial request");
                    false
                } else {
                    true
                }
            }
        }
    }

    fn record_failure(&self, url: &str) {
        let Some(host) = host_of(url) else {
            return;
        };
        let mut hosts = self.hosts.lock();
        let entry = hosts.entry(host.clone()).or_insert_with(HostEntry::new);
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);

        match entry.state {
            HostState::Available if entry.consecutive_failures >= self.failure_threshold => {
                entry.state = HostState::Unavailable;
                entry.unavailable_since = Some(Instant::now());
                warn!(
                    host = %host,
                    failures = entry.consecutive_failures,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Host marked unavailable"
                );
            }
            HostState::Probing => {
                entry.state = HostState::Unavailable;
                entry.unavailable_since = Some(Instant::now());
                entry.trial_started = None;
                debug!(host = %host, "Trial request failed, host still unavailable");
            }
            _ => {}
        }
    }

    fn record_abandoned(&self, url: &str) {
        let Some(host) = host_of(url) else {
            return;
        };
        let mut hosts = self.hosts.lock();
        if let Some(entry) = hosts.get_mut(&host) {
            if entry.state == HostState::Probing {
                // Cooldown already elapsed, so the next check allows a new trial
                entry.state = HostState::Unavailable;
                entry.trial_started = None;
                debug!(host = %host, "Trial request abandoned");
            }
        }
    }

    fn record_success(&self, url: &str) {
        let Some(host) = host_of(url) else {
            return;
        };
        let mut hosts = self.hosts.lock();
        if let Some(entry) = hosts.get_mut(&host) {
            if entry.state != HostState::Available {
                info!(host = %host, "Host available again");
            }
            *entry = HostEntry::new();
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
