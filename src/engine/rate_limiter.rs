use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug)]
struct FireWindow {
    started_at: Instant,
    fires: u32,
}

impl FireWindow {
    fn admit(
        &mut self,
        now: Instant,
        window: Duration,
        max_fires: u32,
    ) -> bool {
        if now.duration_since(self.started_at) >= window {
            self.started_at = now;
            self.fires = 0;
        }
        if self.fires >= max_fires {
            return false;
        }
        self.fires += 1;
        true
    }
}

/// Fixed-window fire cap per watcher id
///
/// Windows are keyed by id, so a reload that keeps a watcher keeps its
/// window. The DashMap shard lock makes check-and-increment atomic.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    window: Duration,
    windows: DashMap<String, FireWindow>,
}

impl RateLimiter {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            windows: DashMap::new(),
        }
    }

    /// Consumes one fire from the watcher's current window if any is left
    pub(crate) fn try_acquire(
        &self,
        watcher_id: &str,
        max_fires: u32,
    ) -> bool {
        if max_fires == 0 {
            return false;
        }
        let now = Instant::now();
        if let Some(mut window) = self.windows.get_mut(watcher_id) {
            return window.admit(now, self.window, max_fires);
        }
        self.windows
            .entry(watcher_id.to_string())
            .or_insert_with(|| FireWindow {
                started_at: now,
                fires: 0,
            })
            .admit(now, self.window, max_fires)
    }

    /// Hands back a fire taken by `try_acquire` that was never dispatched
    pub(crate) fn release(
        &self,
        watcher_id: &str,
    ) {
        if let Some(mut window) = self.windows.get_mut(watcher_id) {
            window.fires = window.fires.saturating_sub(1);
        }
    }

    /// Drops windows of watchers that left the active set
    pub(crate) fn retain(
        &self,
        mut keep: impl FnMut(&str) -> bool,
    ) {
        self.windows.retain(|id, _| keep(id));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.windows.len()
    }
}
