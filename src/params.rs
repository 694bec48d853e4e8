//! Parameter tracker
//!
//! Maps pointer position to generation parameters. The latest values are
//! shown immediately but only read by a session when it starts, so moving
//! the pointer never disturbs the stream that is already running.

use serde::{Deserialize, Serialize};

pub const MIN_TEMPERATURE: f32 = 0.7;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const MIN_CONTEXT: u32 = 1;
pub const MAX_CONTEXT: u32 = 25;

const DEFAULT_TEMPERATURE: f32 = 1.0;
const DEFAULT_CONTEXT: u32 = 8;
const TEMPERATURE_STEP: f32 = 0.05;

/// Body of `POST /generate`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(rename = "temp")]
    pub temperature: f32,
    #[serde(rename = "context")]
    pub context_window: u32,
}

/// Current pointer-derived parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveParams {
    pub temperature: f32,
    pub context_window: u32,
}

impl Default for LiveParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            context_window: DEFAULT_CONTEXT,
        }
    }
}

impl LiveParams {
    /// Explicit values, pulled into range
    pub fn clamped(temperature: f32, context_window: u32) -> Self {
        Self {
            temperature: round2(temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)),
            context_window: context_window.clamp(MIN_CONTEXT, MAX_CONTEXT),
        }
    }
}

/// Horizontal position -> context window, linear over [1, 25]
pub fn context_from_x(x: f32, width: f32) -> u32 {
    let raw = (x / width) * (MAX_CONTEXT - MIN_CONTEXT) as f32 + MIN_CONTEXT as f32;
    raw.clamp(MIN_CONTEXT as f32, MAX_CONTEXT as f32).round() as u32
}

/// Vertical position -> temperature, top of the viewport is hottest
pub fn temperature_from_y(y: f32, height: f32) -> f32 {
    let raw = ((height - y) / height) * 2.0;
    round2(raw.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE))
}

fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Default)]
pub struct ParamTracker {
    live: LiveParams,
}

impl ParamTracker {
    pub fn new(initial: LiveParams) -> Self {
        Self { live: initial }
    }

    /// Values for the on-screen readouts
    pub fn live(&self) -> LiveParams {
        self.live
    }

    pub fn update_from_pointer(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if width > 0.0 {
            self.live.context_window = context_from_x(x, width);
        }
        if height > 0.0 {
            self.live.temperature = temperature_from_y(y, height);
        }
    }

    /// Keyboard fallback for terminals without motion reporting
    pub fn nudge(&mut self, context_delta: i32, temperature_steps: i32) {
        let ctx = self.live.context_window as i64 + context_delta as i64;
        self.live.context_window = ctx.clamp(MIN_CONTEXT as i64, MAX_CONTEXT as i64) as u32;

        let temp = self.live.temperature + temperature_steps as f32 * TEMPERATURE_STEP;
        self.live.temperature = round2(temp.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE));
    }

    /// Fresh request for a session that is about to start
    pub fn snapshot(&self) -> GenerationRequest {
        GenerationRequest {
            temperature: self.live.temperature,
            context_window: self.live.context_window,
        }
    }
}
