//! Per-client admission control: block-list, sliding-window rate limit and
//! single-strike probe detection.
//!
//! Every request is run through three gates in order:
//!
//! 1. a blocked address is rejected outright;
//! 2. the request is recorded in the address's sliding window, and an address
//!    that goes over the threshold is blocked;
//! 3. a path containing one of the configured probe patterns blocks the
//!    address immediately.
//!
//! Blocks only end through [`AdmissionController::unblock`] or
//! [`AdmissionController::reset_security`]. Nothing here is persisted.

use crate::config::AdmissionConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Number of blocked addresses listed in [`SecurityStats::blocked_preview`].
pub const BLOCKED_PREVIEW_LIMIT: usize = 20;
/// Number of addresses listed in [`SecurityStats::top_clients`].
pub const TOP_CLIENTS_LIMIT: usize = 10;

/// At capacity, one tenth of the tracked records is evicted in one pass.
const EVICTION_BATCH_DIVISOR: usize = 10;

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    /// The address is on the block-list.
    Blocked,
    /// The address went over the request threshold.
    RateLimited,
    /// The path matched a probe pattern.
    Suspicious,
}

impl Denial {
    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::Blocked => "blocked",
            Denial::RateLimited => "rate_limited",
            Denial::Suspicious => "suspicious",
        }
    }
}

/// Request history for one client address.
struct ClientRecord {
    hits: VecDeque<Instant>,
    first_seen: u64,
    last_seen: Instant,
}

impl ClientRecord {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) < window {
                break;
            }
            self.hits.pop_front();
        }
    }

    fn live_hits(&self, now: Instant, window: Duration) -> usize {
        self.hits
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < window)
            .count()
    }
}

struct BlockEntry {
    reason: Denial,
    blocked_at: Instant,
    order: u64,
}

/// A blocked address as shown in [`SecurityStats`].
#[derive(Debug, Clone, Serialize)]
pub struct BlockedClient {
    pub address: String,
    pub reason: Denial,
    pub blocked_secs_ago: u64,
}

/// Request volume for one address within the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientActivity {
    pub address: String,
    pub requests: usize,
}

/// Snapshot of admission state for the admin security view.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStats {
    pub blocked_count: usize,
    pub blocked_preview: Vec<BlockedClient>,
    pub recent_requests: usize,
    pub tracked_clients: usize,
    pub top_clients: Vec<ClientActivity>,
}

/// Shared admission state, owned by the server and handed to the middleware.
pub struct AdmissionController {
    policy: AdmissionConfig,
    clients: DashMap<String, ClientRecord>,
    blocked: DashMap<String, BlockEntry>,
    /// Admission holds the read side; unblock, reset, sweep and eviction take
    /// the write side.
    gate: RwLock<()>,
    sequence: AtomicU64,
}

impl AdmissionController {
    pub fn new(mut policy: AdmissionConfig) -> Self {
        for pattern in &mut policy.suspicious_patterns {
            *pattern = pattern.to_ascii_lowercase();
        }
        policy.suspicious_patterns.retain(|p| !p.is_empty());
        policy.max_tracked_clients = policy.max_tracked_clients.max(1);

        Self {
            policy,
            clients: DashMap::new(),
            blocked: DashMap::new(),
            gate: RwLock::new(()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &AdmissionConfig {
        &self.policy
    }

    /// Run the three gates for a request from `address` to `path`.
    pub fn check(&self, address: &str, path: &str) -> Result<(), Denial> {
        self.check_at(address, path, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, address: &str, path: &str, now: Instant) -> Result<(), Denial> {
        if self.clients.len() >= self.policy.max_tracked_clients
            && !self.clients.contains_key(address)
            && !self.blocked.contains_key(address)
        {
            self.make_room();
        }

        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);

        if self.blocked.contains_key(address) {
            warn!(client = %address, path = %path, "Rejected request from blocked client");
            return Err(Denial::Blocked);
        }

        let count = {
            let mut record = self
                .clients
                .entry(address.to_string())
                .or_insert_with(|| ClientRecord {
                    hits: VecDeque::new(),
                    first_seen: self.sequence.fetch_add(1, Ordering::Relaxed),
                    last_seen: now,
                });
            record.prune(now, self.policy.window);
            record.hits.push_back(now);
            record.last_seen = now;
            record.hits.len()
        };

        if count > self.policy.max_requests {
            self.block(address, Denial::RateLimited, now);
            warn!(
                client = %address,
                requests = count,
                window_secs = self.policy.window.as_secs(),
                "Client exceeded rate limit, blocking"
            );
            return Err(Denial::RateLimited);
        }

        if let Some(pattern) = self.suspicious_pattern(path) {
            self.block(address, Denial::Suspicious, now);
            warn!(
                client = %address,
                path = %path,
                pattern = %pattern,
                "Suspicious request, blocking client"
            );
            return Err(Denial::Suspicious);
        }

        Ok(())
    }

    /// First configured suspicious pattern found in `text`, ignoring case.
    pub fn suspicious_pattern(&self, text: &str) -> Option<&str> {
        let lowered = text.to_ascii_lowercase();
        self.policy
            .suspicious_patterns
            .iter()
            .find(|p| lowered.contains(p.as_str()))
            .map(String::as_str)
    }

    fn block(&self, address: &str, reason: Denial, now: Instant) {
        self.blocked
            .entry(address.to_string())
            .or_insert_with(|| BlockEntry {
                reason,
                blocked_at: now,
                order: self.sequence.fetch_add(1, Ordering::Relaxed),
            });
    }

    pub fn is_blocked(&self, address: &str) -> bool {
        self.blocked.contains_key(address)
    }

    /// Lift the block on `address` and forget its history.
    ///
    /// Returns whether the address had been blocked.
    pub fn unblock(&self, address: &str) -> bool {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let was_blocked = self.blocked.remove(address).is_some();
        self.clients.remove(address);
        info!(client = %address, was_blocked, "Client unblocked");
        was_blocked
    }

    /// Drop every block and every client record.
    pub fn reset_security(&self) {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let blocked = self.blocked.len();
        let tracked = self.clients.len();
        self.blocked.clear();
        self.clients.clear();
        warn!(blocked, tracked, "Security state reset");
    }

    /// Remove client records with no request inside the window.
    ///
    /// Returns how many records were dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let window = self.policy.window;
        let before = self.clients.len();
        self.clients.retain(|_, record| {
            record.prune(now, window);
            !record.hits.is_empty()
        });
        before.saturating_sub(self.clients.len())
    }

    /// Evict the least recently seen records so a new address fits.
    ///
    /// Evicts a batch at a time, so the scan runs once per
    /// `capacity / EVICTION_BATCH_DIVISOR` new addresses rather than on each.
    /// Stale records sort first, since their `last_seen` is oldest.
    fn make_room(&self) {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.policy.max_tracked_clients;
        let tracked = self.clients.len();
        // Another thread may have made room while we waited for the gate.
        if tracked < capacity {
            return;
        }

        let batch = (capacity / EVICTION_BATCH_DIVISOR)
            .max(tracked + 1 - capacity)
            .min(tracked);
        let mut candidates: Vec<(Instant, u64, String)> = self
            .clients
            .iter()
            .map(|entry| {
                (
                    entry.value().last_seen,
                    entry.value().first_seen,
                    entry.key().clone(),
                )
            })
            .collect();
        if batch < candidates.len() {
            candidates.select_nth_unstable(batch);
            candidates.truncate(batch);
        }

        for (_, _, address) in &candidates {
            self.clients.remove(address);
        }
        debug!(
            evicted = candidates.len(),
            tracked = self.clients.len(),
            "Evicted least recently seen client records"
        );
    }

    pub fn stats(&self) -> SecurityStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> SecurityStats {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let window = self.policy.window;

        let mut blocked: Vec<(u64, BlockedClient)> = self
            .blocked
            .iter()
            .map(|entry| {
                (
                    entry.value().order,
                    BlockedClient {
                        address: entry.key().clone(),
                        reason: entry.value().reason,
                        blocked_secs_ago: now
                            .saturating_duration_since(entry.value().blocked_at)
                            .as_secs(),
                    },
                )
            })
            .collect();
        blocked.sort_by_key(|(order, _)| *order);
        let blocked_count = blocked.len();

        let mut activity: Vec<(u64, ClientActivity)> = self
            .clients
            .iter()
            .map(|entry| {
                (
                    entry.value().first_seen,
                    ClientActivity {
                        address: entry.key().clone(),
                        requests: entry.value().live_hits(now, window),
                    },
                )
            })
            .filter(|(_, a)| a.requests > 0)
            .collect();
        let recent_requests = activity.iter().map(|(_, a)| a.requests).sum();
        let tracked_clients = self.clients.len();
        activity.sort_by(|(seen_a, a), (seen_b, b)| {
            b.requests.cmp(&a.requests).then(seen_a.cmp(seen_b))
        });

        SecurityStats {
            blocked_count,
            blocked_preview: blocked
                .into_iter()
                .take(BLOCKED_PREVIEW_LIMIT)
                .map(|(_, b)| b)
                .collect(),
            recent_requests,
            tracked_clients,
            top_clients: activity
                .into_iter()
                .take(TOP_CLIENTS_LIMIT)
                .map(|(_, a)| a)
                .collect(),
        }
    }
}
