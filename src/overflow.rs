//! Overflow monitor
//!
//! Measures wrapped text against the container after every buffer change
//! or resize. Overflow schedules a restart through a single pending slot
//! with a short debounce, so a burst of triggers collapses into one
//! restart. Once a restart fires, overflow detection stays disarmed until
//! the new session's first fragment has replaced the buffer; the old text
//! is still on screen until then and would otherwise trigger again.

use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthChar;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

// ═══════════════════════════════════════════════════════════════
// MEASUREMENT
// ═══════════════════════════════════════════════════════════════

/// Hard-wrap `text` at `width` display columns. Explicit newlines start a
/// new row. The surface renders exactly these rows, so measuring and
/// drawing can never disagree.
pub fn wrap_lines(text: &str, width: u16) -> Vec<String> {
    let width = width.max(1) as usize;
    let mut rows = Vec::new();
    if text.is_empty() {
        return rows;
    }

    for logical in text.split('\n') {
        let mut row = String::new();
        let mut used = 0;

        for c in logical.chars() {
            let c = if c == '\t' { ' ' } else { c };
            let w = match c.width() {
                Some(w) => w,
                None => continue,
            };
            if used + w > width && used > 0 {
                rows.push(std::mem::take(&mut row));
                used = 0;
            }
            row.push(c);
            used += w;
        }
        rows.push(row);
    }

    rows
}

/// Content vs. container, both in rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerMetrics {
    pub content_extent: usize,
    pub container_extent: usize,
}

impl ContainerMetrics {
    pub fn measure(rows: usize, container_rows: u16) -> Self {
        Self {
            content_extent: rows,
            container_extent: container_rows as usize,
        }
    }

    pub fn overflows(&self) -> bool {
        self.content_extent > self.container_extent
    }

    /// Scroll offset that keeps the newest row visible
    pub fn tail_scroll(&self) -> usize {
        self.content_extent.saturating_sub(self.container_extent)
    }
}

// ═══════════════════════════════════════════════════════════════
// RESTART SLOT
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    Overflow,
    User,
}

/// One pending restart at most. Requests made while one is pending
/// collapse into it. A user request within the debounce window after a
/// restart fired collapses into that restart too; overflow requests are
/// gated by the monitor's arming instead, since they always come from
/// the new session's own content.
#[derive(Debug)]
pub struct RestartSlot {
    debounce: Duration,
    pending: Option<(Instant, RestartReason)>,
    last_fired: Option<Instant>,
}

impl RestartSlot {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: None,
            last_fired: None,
        }
    }

    /// Returns false if the request collapsed into an existing restart
    pub fn request(&mut self, now: Instant, delay: Duration, reason: RestartReason) -> bool {
        let deadline = now + delay;

        if let Some((pending_at, pending_reason)) = self.pending {
            // keep the earliest deadline; a user restart outranks overflow
            let reason = if reason == RestartReason::User { reason } else { pending_reason };
            self.pending = Some((pending_at.min(deadline), reason));
            return false;
        }

        if reason == RestartReason::User {
            if let Some(fired) = self.last_fired {
                if now.saturating_duration_since(fired) < self.debounce {
                    return false;
                }
            }
        }

        self.pending = Some((deadline, reason));
        true
    }

    /// Take the restart if its deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<RestartReason> {
        match self.pending {
            Some((deadline, reason)) if now >= deadline => {
                self.pending = None;
                self.last_fired = Some(now);
                Some(reason)
            }
            _ => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(d, _)| d)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

// ═══════════════════════════════════════════════════════════════
// MONITOR
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Content fits; follow the tail
    Fits { scroll: usize },
    /// Content spilled; `scheduled` is true if this check queued a restart
    Overflow { scroll: usize, scheduled: bool },
}

#[derive(Debug)]
pub struct OverflowMonitor {
    slot: RestartSlot,
    armed: bool,
    last: ContainerMetrics,
    overflow_events: u64,
}

impl OverflowMonitor {
    pub fn new(debounce: Duration) -> Self {
        Self {
            slot: RestartSlot::new(debounce),
            armed: true,
            last: ContainerMetrics::default(),
            overflow_events: 0,
        }
    }

    /// Evaluate fresh metrics after a render-affecting change
    pub fn check(&mut self, metrics: ContainerMetrics, now: Instant) -> Verdict {
        self.last = metrics;
        let scroll = metrics.tail_scroll();

        if !metrics.overflows() {
            return Verdict::Fits { scroll };
        }

        let scheduled = self.armed
            && !self.slot.is_pending()
            && self.slot.request(now, self.slot.debounce(), RestartReason::Overflow);
        if scheduled {
            self.overflow_events += 1;
            tracing::debug!(
                content = metrics.content_extent,
                container = metrics.container_extent,
                "overflow, restart scheduled"
            );
        }

        Verdict::Overflow { scroll, scheduled }
    }

    /// User-initiated restart, due immediately
    pub fn request_user_restart(&mut self, now: Instant) -> bool {
        self.slot.request(now, Duration::ZERO, RestartReason::User)
    }

    /// Fire the pending restart if due. Disarms overflow detection until
    /// `rearm` is called.
    pub fn poll(&mut self, now: Instant) -> Option<RestartReason> {
        let fired = self.slot.poll(now);
        if fired.is_some() {
            self.armed = false;
        }
        fired
    }

    /// The restarted session has replaced the buffer
    pub fn rearm(&mut self) {
        self.armed = true;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.slot.deadline()
    }

    pub fn last_metrics(&self) -> ContainerMetrics {
        self.last
    }

    pub fn overflow_events(&self) -> u64 {
        self.overflow_events
    }
}
