//! User Story Integration Tests
//!
//! These tests trace complete workflows through the controller with
//! narrated steps, so a failing story shows where it went wrong.
//!
//! Streams are scripted: each session the controller opens gets the next
//! channel in line, and the test pushes raw NDJSON bytes into it.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use overspill::client::{ChunkStream, GenerationSource};
use overspill::controller::{ContainerSize, Controller, Phase};
use overspill::error::StreamError;
use overspill::ndjson::Record;
use overspill::params::{GenerationRequest, LiveParams};
use overspill::session::{Delivery, SessionEvent};

/// Test helper to capture and display trace logs
struct TestTracer {
    name: String,
}

impl TestTracer {
    fn new(name: &str) -> Self {
        eprintln!("\n╔═══════════════════════════════════════════════════════════════");
        eprintln!("║ USER STORY: {}", name);
        eprintln!("╚═══════════════════════════════════════════════════════════════\n");
        Self { name: name.to_string() }
    }

    fn step(&mut self, description: &str) {
        eprintln!("  → {}", description);
    }

    fn expect(&mut self, condition: bool, description: &str) {
        let status = if condition { "✓" } else { "✗" };
        eprintln!("    {} {}", status, description);
        assert!(condition, "FAILED: {}", description);
    }

    fn done(&self) {
        eprintln!("\n  ══════════════════════════════════════════════════════");
        eprintln!("  ✓ Story completed: {}", self.name);
        eprintln!();
    }
}

// ═══════════════════════════════════════════════════════════════
// SCRIPTED BACKEND
// ═══════════════════════════════════════════════════════════════

type Feed = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Default)]
struct Scripted {
    queued: Mutex<VecDeque<mpsc::UnboundedReceiver<Vec<u8>>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Scripted {
    /// Prepare the body of the next session to be opened
    fn next_stream(&self) -> Feed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queued.lock().unwrap().push_back(rx);
        tx
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationSource for Scripted {
    async fn open(&self, request: GenerationRequest) -> Result<ChunkStream, StreamError> {
        self.requests.lock().unwrap().push(request);
        let rx = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(StreamError::Status { status: 503, body: "no script".into() })?;

        let chunks = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, StreamError>(chunk), rx))
        });
        Ok(chunks.boxed())
    }
}

fn line(text: &str) -> Vec<u8> {
    format!("{}\n", serde_json::json!({ "text": text })).into_bytes()
}

struct Rig {
    controller: Controller,
    deliveries: mpsc::Receiver<Delivery>,
    source: Arc<Scripted>,
}

impl Rig {
    fn new(container: ContainerSize) -> Self {
        let source = Arc::new(Scripted::default());
        let (tx, deliveries) = mpsc::channel(256);
        let now = Instant::now();
        let mut controller = Controller::new(
            source.clone(),
            tx,
            LiveParams::default(),
            Duration::from_millis(100),
            now,
        );
        controller.resize(container, now);
        Self { controller, deliveries, source }
    }

    /// Feed deliveries to the controller until `done` holds
    async fn pump_until(&mut self, done: impl Fn(&Controller) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !done(&self.controller) {
            let delivery = tokio::time::timeout_at(deadline, self.deliveries.recv())
                .await
                .expect("timed out waiting for stream data")
                .expect("delivery channel closed");
            self.controller.deliver(delivery, Instant::now());
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// STORY: Clicking mid-stream resets the surface
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_click_mid_stream_discards_old_session() {
    let mut t = TestTracer::new("Click mid-stream discards the superseded session");
    let mut rig = Rig::new(ContainerSize { width: 40, height: 10 });

    t.step("Given session A streaming \"foo\" then \"bar\"");
    let feed_a = rig.source.next_stream();
    let feed_b = rig.source.next_stream();
    rig.controller.boot(Instant::now());
    let a = rig.controller.current_session().unwrap();
    feed_a.send(line("foo")).unwrap();
    feed_a.send(line("bar")).unwrap();
    rig.pump_until(|c| c.text() == "foobar").await;
    t.expect(rig.controller.text() == "foobar", "Surface shows \"foobar\"");

    t.step("When the user clicks");
    rig.controller.pointer_down(Instant::now());
    let b = rig.controller.current_session().unwrap();
    t.expect(a != b, "A new session B is current");

    t.step("And session A still delivers \"baz\" after cancellation");
    let _ = feed_a.send(line("baz"));
    rig.controller.deliver(
        Delivery {
            session: a,
            event: SessionEvent::Record(Record { text: Some("baz".into()), count: None }),
        },
        Instant::now(),
    );
    t.expect(rig.controller.text() == "foobar", "Late \"baz\" is discarded");

    t.step("And session B delivers its first fragment \"qux\"");
    feed_b.send(line("qux")).unwrap();
    rig.pump_until(|c| !c.text().starts_with("foo")).await;
    t.expect(rig.controller.text() == "qux", "Surface shows only \"qux\"");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Pointer movement only affects the next session
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_pointer_tunes_next_session_only() {
    let mut t = TestTracer::new("Pointer movement tunes the next session only");
    let mut rig = Rig::new(ContainerSize { width: 40, height: 10 });
    let feed_a = rig.source.next_stream();
    let feed_b = rig.source.next_stream();

    t.step("Given a running session with default parameters");
    rig.controller.boot(Instant::now());
    feed_a.send(line("x")).unwrap();
    rig.pump_until(|c| c.text() == "x").await;

    t.step("When the pointer moves to the top-right corner");
    rig.controller.pointer_moved(99.0, 0.0, 99.0, 49.0);
    let live = rig.controller.live_params();
    t.expect(live.context_window == 25, "Context readout shows 25");
    t.expect(live.temperature == 2.0, "Temperature readout shows 2.00");
    t.expect(
        rig.controller.session_request() == Some(GenerationRequest { temperature: 1.0, context_window: 8 }),
        "Running session keeps its original parameters",
    );

    t.step("When the user clicks");
    rig.controller.pointer_down(Instant::now());
    feed_b.send(line("y")).unwrap();
    rig.pump_until(|c| c.text() == "y").await;

    let sent = rig.source.requests();
    t.expect(sent.len() == 2, "Two requests reached the backend");
    t.expect(
        sent[1] == GenerationRequest { temperature: 2.0, context_window: 25 },
        "Second request carries the latest pointer parameters",
    );

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: Filling the surface restarts the stream once
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_full_surface_restarts_once() {
    let mut t = TestTracer::new("Full surface triggers exactly one restart");
    let mut rig = Rig::new(ContainerSize { width: 5, height: 2 });
    let feed_a = rig.source.next_stream();
    let feed_b = rig.source.next_stream();
    let t0 = Instant::now();

    t.step("Given a 5x2 surface and a stream writing 15 characters");
    rig.controller.boot(t0);
    let a = rig.controller.current_session().unwrap();
    for chunk in ["hello", "world", "again"] {
        feed_a.send(line(chunk)).unwrap();
    }
    rig.pump_until(|c| c.text().len() == 15).await;
    t.expect(rig.controller.phase() == Phase::Overflow, "Surface reports overflow");
    t.expect(rig.controller.restart_deadline().is_some(), "A restart is pending");

    t.step("When the debounce window passes");
    let fire_at = rig.controller.restart_deadline().unwrap();
    rig.controller.tick(fire_at);
    rig.controller.tick(fire_at + Duration::from_millis(50));
    rig.controller.tick(fire_at + Duration::from_millis(500));

    let b = rig.controller.current_session().unwrap();
    t.expect(a != b, "Stream was restarted");
    t.expect(rig.controller.traces().restarts.overflow == 1, "Exactly one overflow restart");

    t.step("When the new session writes its first fragment");
    feed_b.send(line("fresh")).unwrap();
    rig.pump_until(|c| c.text() == "fresh").await;
    t.expect(rig.controller.phase() == Phase::Streaming, "Back to streaming");
    t.expect(rig.controller.rows() == ["fresh"], "Surface holds only the new text");

    t.done();
}

// ═══════════════════════════════════════════════════════════════
// STORY: A broken stream waits for the user
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn story_failed_stream_is_not_retried() {
    let mut t = TestTracer::new("Failed stream stops and waits for a restart");
    let mut rig = Rig::new(ContainerSize { width: 20, height: 5 });

    t.step("Given a backend with nothing scripted (answers 503)");
    rig.controller.boot(Instant::now());
    rig.pump_until(|c| c.phase() == Phase::Error).await;
    t.expect(rig.controller.current_session().is_none(), "No session is current");

    t.step("When time passes without user input");
    rig.controller.tick(Instant::now() + Duration::from_secs(30));
    t.expect(rig.source.requests().len() == 1, "No automatic retry happened");

    t.step("When the user clicks");
    let _feed = rig.source.next_stream();
    rig.controller.pointer_down(Instant::now() + Duration::from_secs(31));
    t.expect(rig.controller.current_session().is_some(), "A new session starts");

    t.done();
}
