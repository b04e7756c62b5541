//! Suppression of redelivered messages.
//!
//! The platform may deliver the same batch more than once. [`RecentMessages`]
//! remembers message ids for a bounded time window so a redelivered message
//! does not produce a second reply.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Seen {
    order: VecDeque<(Instant, String)>,
    ids: HashSet<String>,
}

impl Seen {
    fn evict_expired(&mut self, now: Instant, window: Duration) {
        while let Some((seen_at, _)) = self.order.front() {
            if now.duration_since(*seen_at) < window {
                break;
            }
            if let Some((_, id)) = self.order.pop_front() {
                self.ids.remove(&id);
            }
        }
    }
}

/// Bounded, time-windowed set of recently handled message ids.
#[derive(Debug)]
pub struct RecentMessages {
    window: Duration,
    capacity: usize,
    seen: Mutex<Seen>,
}

impl RecentMessages {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            seen: Mutex::new(Seen::default()),
        }
    }

    /// Record `id` and report whether it is new within the window.
    ///
    /// Messages without an id cannot be deduplicated and always count as new.
    pub fn first_sighting(&self, id: &str) -> bool {
        self.first_sighting_at(id, Instant::now())
    }

    fn first_sighting_at(&self, id: &str, now: Instant) -> bool {
        if id.is_empty() {
            return true;
        }

        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.evict_expired(now, self.window);

        if seen.ids.contains(id) {
            return false;
        }

        seen.ids.insert(id.to_string());
        seen.order.push_back((now, id.to_string()));
        while seen.order.len() > self.capacity {
            if let Some((_, oldest)) = seen.order.pop_front() {
                seen.ids.remove(&oldest);
            }
        }
        true
    }

    /// Number of ids currently remembered
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
