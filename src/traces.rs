//! Stream traces
//!
//! Ring buffers for the status readouts:
//! - latency from session start to first fragment
//! - fragments per second
//! - restarts by cause

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Ring buffer for trace data
#[derive(Debug)]
pub struct TraceBuffer {
    samples: VecDeque<f64>,
    max_samples: usize,
    pub label: String,
    pub unit: String,
}

impl TraceBuffer {
    pub fn new(label: &str, unit: &str, max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
            label: label.to_string(),
            unit: unit.to_string(),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn sparkline(&self, width: usize) -> String {
        const BARS: &[char] = &['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

        let samples: Vec<f64> = self.samples.iter().rev().take(width).copied().collect();
        if samples.is_empty() {
            return " ".repeat(width);
        }

        let max = samples.iter().cloned().fold(f64::MIN, f64::max).max(1.0);
        let min = samples.iter().cloned().fold(f64::MAX, f64::min).min(0.0);
        let range = (max - min).max(1.0);

        let mut result: String = samples
            .iter()
            .rev()
            .map(|v| {
                let normalized = ((v - min) / range).clamp(0.0, 1.0);
                BARS[(normalized * (BARS.len() - 1) as f64).round() as usize]
            })
            .collect();

        // Pad if not enough samples
        while result.chars().count() < width {
            result.insert(0, ' ');
        }

        result
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Fragments per second, sampled once a second
#[derive(Debug)]
pub struct RateTrace {
    pub rate: TraceBuffer,
    window_start: Instant,
    in_window: u64,
    pub total: u64,
}

impl RateTrace {
    pub fn new(max_samples: usize, now: Instant) -> Self {
        Self {
            rate: TraceBuffer::new("Rate", "frag/s", max_samples),
            window_start: now,
            in_window: 0,
            total: 0,
        }
    }

    pub fn record(&mut self) {
        self.in_window += 1;
        self.total += 1;
    }

    /// Close the window if a second has passed
    pub fn tick(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= Duration::from_secs(1) {
            self.rate.push(self.in_window as f64 / elapsed.as_secs_f64());
            self.in_window = 0;
            self.window_start = now;
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestartCounts {
    pub overflow: u64,
    pub user: u64,
}

/// All traces combined
#[derive(Debug)]
pub struct Traces {
    pub first_fragment: TraceBuffer,
    pub fragments: RateTrace,
    pub restarts: RestartCounts,
    session_started: Option<Instant>,
}

impl Traces {
    pub fn new(now: Instant) -> Self {
        let max_samples = 120; // 2 minutes at 1Hz

        Self {
            first_fragment: TraceBuffer::new("First", "ms", max_samples),
            fragments: RateTrace::new(max_samples, now),
            restarts: RestartCounts::default(),
            session_started: None,
        }
    }

    pub fn session_started(&mut self, now: Instant) {
        self.session_started = Some(now);
    }

    pub fn fragment(&mut self, now: Instant) {
        if let Some(start) = self.session_started.take() {
            self.first_fragment
                .push(now.saturating_duration_since(start).as_millis() as f64);
        }
        self.fragments.record();
    }

    /// Render traces as multi-line summary using buffer labels and units
    pub fn render(&self, width: usize) -> Vec<String> {
        let sw = width.saturating_sub(24).min(30);

        vec![
            format!(
                "{}: {} [{:>6} total, {:.1} {}]",
                self.fragments.rate.label,
                self.fragments.rate.sparkline(sw),
                format_count(self.fragments.total),
                self.fragments.rate.last().unwrap_or(0.0),
                self.fragments.rate.unit,
            ),
            format!(
                "{}: {} [{:.0} {} avg, {} samples]",
                self.first_fragment.label,
                self.first_fragment.sparkline(sw),
                self.first_fragment.average().unwrap_or(0.0),
                self.first_fragment.unit,
                self.first_fragment.len(),
            ),
            format!(
                "Restarts: {} overflow, {} user",
                self.restarts.overflow, self.restarts.user
            ),
        ]
    }
}

fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}
