//! In-process sliding-window limiter.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::RateLimiter;
use crate::shared::KitResult;

/// Keeps the event instants of every key in memory.
///
/// Only events strictly newer than `now - window` count. Keys whose window
/// has emptied are dropped, at the latest one window after their last event.
#[derive(Debug)]
pub struct MemoryRateLimiter {
    limit: u64,
    window: Duration,
    state: Mutex<Windows>,
}

#[derive(Debug)]
struct Windows {
    events: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl MemoryRateLimiter {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(Windows {
                events: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    fn prune(&self, events: &mut VecDeque<Instant>, now: Instant) {
        let Some(window_start) = now.checked_sub(self.window) else {
            return;
        };
        // Instants are pushed in order, so stale ones sit at the front
        while events.front().is_some_and(|t| *t <= window_start) {
            events.pop_front();
        }
    }

    fn sweep(&self, state: &mut Windows, now: Instant) {
        state.events.retain(|_, events| {
            self.prune(events, now);
            !events.is_empty()
        });
        state.last_sweep = now;
    }

    fn allow_n_at(&self, key: &str, n: u64, now: Instant) -> bool {
        let mut state = self.state.lock();
        if now.saturating_duration_since(state.last_sweep) >= self.window {
            self.sweep(&mut state, now);
        }

        let used = match state.events.get_mut(key) {
            Some(events) => {
                self.prune(events, now);
                events.len() as u64
            }
            None => 0,
        };

        let admitted = n <= self.limit.saturating_sub(used);
        let count = match usize::try_from(n) {
            Ok(count) if admitted => count,
            _ => {
                if used == 0 {
                    state.events.remove(key);
                }
                return false;
            }
        };

        if count > 0 {
            state
                .events
                .entry(key.to_string())
                .or_default()
                .extend(std::iter::repeat(now).take(count));
        }
        true
    }

    fn remaining_at(&self, key: &str, now: Instant) -> u64 {
        let mut state = self.state.lock();
        let used = match state.events.get_mut(key) {
            Some(events) => {
                self.prune(events, now);
                events.len() as u64
            }
            None => return self.limit,
        };
        if used == 0 {
            state.events.remove(key);
        }
        self.limit.saturating_sub(used)
    }

    /// Drop keys whose events have all left the window.
    pub fn purge_expired(&self) {
        let mut state = self.state.lock();
        self.sweep(&mut state, Instant::now());
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.state.lock().events.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn allow_n(&self, key: &str, n: u64) -> KitResult<bool> {
        Ok(self.allow_n_at(key, n, Instant::now()))
    }

    async fn reset(&self, key: &str) -> KitResult<()> {
        self.state.lock().events.remove(key);
        Ok(())
    }

    async fn remaining(&self, key: &str) -> KitResult<u64> {
        Ok(self.remaining_at(key, Instant::now()))
    }
}
