//! Top-level controller
//!
//! Composes the parameter tracker, session manager, render buffer and
//! overflow monitor into one state machine:
//!
//! ```text
//! Idle -> Streaming -> (Overflow | UserRestart | Error | Ended) -> Streaming
//! ```
//!
//! Everything here runs on the UI task. Stream tasks only talk to it
//! through `Delivery` values, which `deliver` gates by session id.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::buffer::RenderBuffer;
use crate::client::GenerationSource;
use crate::overflow::{wrap_lines, ContainerMetrics, OverflowMonitor, RestartReason, Verdict};
use crate::params::{GenerationRequest, LiveParams, ParamTracker};
use crate::session::{ApplyMode, Delivery, SessionId, SessionManager, Step};
use crate::traces::Traces;

const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the first session
    Idle,
    Streaming,
    /// Content spilled; restart pending
    Overflow,
    /// Restart requested by the user
    UserRestart,
    /// Stream failed; waiting for the next restart
    Error,
    /// Stream finished cleanly; waiting for the next restart
    Ended,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Streaming => "STREAMING",
            Phase::Overflow => "OVERFLOW",
            Phase::UserRestart => "RESTART",
            Phase::Error => "ERROR",
            Phase::Ended => "ENDED",
        }
    }
}

/// Inner size of the text container, in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerSize {
    pub width: u16,
    pub height: u16,
}

pub struct Controller {
    phase: Phase,
    params: ParamTracker,
    sessions: SessionManager,
    buffer: RenderBuffer,
    monitor: OverflowMonitor,
    container: ContainerSize,
    rows: Vec<String>,
    scroll: usize,
    last_count: Option<u64>,
    traces: Traces,
    log: VecDeque<String>,
}

impl Controller {
    pub fn new(
        source: Arc<dyn GenerationSource>,
        tx: mpsc::Sender<Delivery>,
        initial: LiveParams,
        debounce: Duration,
        now: Instant,
    ) -> Self {
        Self {
            phase: Phase::Idle,
            params: ParamTracker::new(initial),
            sessions: SessionManager::new(source, tx),
            buffer: RenderBuffer::new(),
            monitor: OverflowMonitor::new(debounce),
            container: ContainerSize::default(),
            rows: Vec::new(),
            scroll: 0,
            last_count: None,
            traces: Traces::new(now),
            log: VecDeque::new(),
        }
    }

    /// First automatic session. Only leaves `Idle` once.
    pub fn boot(&mut self, now: Instant) {
        if self.phase == Phase::Idle {
            self.start_session(true, now);
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // INPUT
    // ═══════════════════════════════════════════════════════════════

    /// Pointer motion. Only the readouts and the next session see this.
    pub fn pointer_moved(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.params.update_from_pointer(x, y, width, height);
    }

    pub fn nudge_params(&mut self, context_delta: i32, temperature_steps: i32) {
        self.params.nudge(context_delta, temperature_steps);
    }

    /// Pointer-down / restart key: restart right away, even mid-stream
    pub fn pointer_down(&mut self, now: Instant) {
        if self.monitor.request_user_restart(now) {
            self.phase = Phase::UserRestart;
        }
        self.tick(now);
    }

    /// Viewport changed: re-measure without waiting for new text
    pub fn resize(&mut self, container: ContainerSize, now: Instant) {
        if self.container != container {
            self.container = container;
            self.remeasure(now);
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // STREAM
    // ═══════════════════════════════════════════════════════════════

    pub fn deliver(&mut self, delivery: Delivery, now: Instant) {
        let session = delivery.session;
        let step = match self.sessions.accept(delivery) {
            Some(step) => step,
            None => return,
        };

        match step {
            Step::Opened => {
                self.phase = Phase::Streaming;
                self.push_log(format!("Session {} streaming", session));
            }
            Step::Fragment { text, mode, count } => {
                self.buffer.apply(&text, mode);
                if mode == ApplyMode::Replace {
                    self.monitor.rearm();
                }
                if count.is_some() {
                    self.last_count = count;
                }
                self.traces.fragment(now);
                self.remeasure(now);
            }
            Step::Progress { count } => {
                if count.is_some() {
                    self.last_count = count;
                }
            }
            Step::Ended => {
                self.phase = Phase::Ended;
                self.push_log(format!("Session {} ended", session));
            }
            Step::Failed(reason) => {
                self.phase = Phase::Error;
                self.push_log(format!("Session {} failed: {}", session, reason));
            }
        }
    }

    /// Fire a due restart and roll the rate window
    pub fn tick(&mut self, now: Instant) {
        self.traces.fragments.tick(now);

        if let Some(reason) = self.monitor.poll(now) {
            match reason {
                RestartReason::Overflow => {
                    self.traces.restarts.overflow += 1;
                    self.push_log("Surface full, restarting");
                }
                RestartReason::User => {
                    self.traces.restarts.user += 1;
                    self.push_log("Restart requested");
                }
            }
            self.start_session(true, now);
        }
    }

    /// Teardown: cancel the live session
    pub fn shutdown(&mut self) {
        self.sessions.shutdown();
    }

    fn start_session(&mut self, reset: bool, now: Instant) -> SessionId {
        let request = self.params.snapshot();
        let id = self.sessions.start(request, reset);
        self.traces.session_started(now);
        self.phase = Phase::Streaming;
        self.push_log(format!(
            "Session {} started (temp {:.2}, context {})",
            id, request.temperature, request.context_window
        ));
        id
    }

    fn remeasure(&mut self, now: Instant) {
        if self.container.width == 0 || self.container.height == 0 {
            return;
        }

        self.rows = wrap_lines(self.buffer.as_str(), self.container.width);
        let metrics = ContainerMetrics::measure(self.rows.len(), self.container.height);

        match self.monitor.check(metrics, now) {
            Verdict::Fits { scroll } => self.scroll = scroll,
            Verdict::Overflow { scroll, scheduled } => {
                self.scroll = scroll;
                if scheduled {
                    self.phase = Phase::Overflow;
                }
            }
        }
    }

    fn push_log(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!("{}", msg);
        let now = chrono::Local::now().format("%H:%M:%S");
        if self.log.len() >= MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(format!("[{}] {}", now, msg));
    }

    // ═══════════════════════════════════════════════════════════════
    // VIEW
    // ═══════════════════════════════════════════════════════════════

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn text(&self) -> &str {
        self.buffer.as_str()
    }

    /// Wrapped rows as measured for the current container
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn live_params(&self) -> LiveParams {
        self.params.live()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.sessions.current_id()
    }

    /// Parameters the running session was started with
    pub fn session_request(&self) -> Option<GenerationRequest> {
        self.sessions.current_request()
    }

    pub fn last_count(&self) -> Option<u64> {
        self.last_count
    }

    pub fn metrics(&self) -> ContainerMetrics {
        self.monitor.last_metrics()
    }

    pub fn restart_deadline(&self) -> Option<Instant> {
        self.monitor.deadline()
    }

    pub fn traces(&self) -> &Traces {
        &self.traces
    }

    pub fn log_lines(&self) -> impl DoubleEndedIterator<Item = &String> {
        self.log.iter()
    }

    /// Record something that happened outside the stream (printing etc.)
    pub fn note(&mut self, msg: impl Into<String>) {
        self.push_log(msg);
    }
}
