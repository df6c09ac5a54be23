//! Confirmation gate around the live recognition loop.
//!
//! A running gate owns three tasks: capture fills the frame buffer, display
//! renders the newest frame, and processing runs recognition on frames it has
//! not seen yet. As soon as a valid candidate appears the gate moves to
//! `AwaitingConfirmation` and processing stops until the operator confirms or
//! cancels it. Capture and display never pause.

pub mod snapshot;


pub use snapshot::SnapshotStore;

use crate::capture::{Frame, FrameBuffer, FrameSource, HealthMonitor, StreamHealth};
use crate::config::{CandidatePolicy, Config};
use crate::db::models::EntryKind;
use crate::error::{Error, Result};
use crate::ledger::{normalize_plate, Ledger};
use crate::recognition::{Candidate, RecognitionPipeline};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Streaming,
    AwaitingConfirmation,
}

/// Operator-facing side of the review step.
///
/// `on_candidate` is called once for every candidate put under review; the
/// operator must answer with [`ProcessingGate::confirm`] or
/// [`ProcessingGate::cancel`]. It runs on a gate task and should return quickly.
pub trait OperatorSurface: Send + Sync {
    fn on_candidate(&self, candidate: &Candidate);
}

/// Receives the newest frame on every display tick
pub trait DisplaySink: Send + Sync {
    fn render(&self, frame: &Frame);
}

/// Runtime settings of a gate
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub capture_interval: Duration,
    pub process_interval: Duration,
    pub display_interval: Duration,
    pub max_consecutive_read_failures: u32,
    pub candidate_policy: CandidatePolicy,
    /// Confirmed frames are stored here when set
    pub snapshot_dir: Option<PathBuf>,
}

impl GateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device: config.camera.device.clone(),
            width: config.camera.width,
            height: config.camera.height,
            capture_interval: Duration::from_millis(config.pipeline.capture_interval_ms.max(1)),
            process_interval: Duration::from_millis(config.pipeline.process_interval_ms.max(1)),
            display_interval: Duration::from_millis(config.pipeline.display_interval_ms.max(1)),
            max_consecutive_read_failures: config.pipeline.max_consecutive_read_failures,
            candidate_policy: config.recognition.candidate_policy,
            snapshot_dir: config.storage.captured_images_dir.clone(),
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct Review {
    state: GateState,
    /// Candidate shown to the operator; taken out while a confirm is committing
    pending: Option<Candidate>,
    queue: VecDeque<Candidate>,
    /// Bumped on every start so late confirms cannot touch a newer session
    session: u64,
}

struct GateInner {
    settings: GateSettings,
    source: AsyncMutex<Box<dyn FrameSource>>,
    buffer: FrameBuffer,
    health: HealthMonitor,
    pipeline: RecognitionPipeline,
    ledger: Arc<Ledger>,
    operator: Arc<dyn OperatorSurface>,
    snapshots: Option<SnapshotStore>,
    review: Mutex<Review>,
}

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct ProcessingGate {
    inner: Arc<GateInner>,
    display: Option<Arc<dyn DisplaySink>>,
    running: AsyncMutex<Option<Running>>,
}

impl ProcessingGate {
    pub fn new(
        settings: GateSettings,
        source: Box<dyn FrameSource>,
        pipeline: RecognitionPipeline,
        ledger: Arc<Ledger>,
        operator: Arc<dyn OperatorSurface>,
    ) -> Self {
        let snapshots = settings.snapshot_dir.clone().map(SnapshotStore::new);
        let health = HealthMonitor::new(settings.max_consecutive_read_failures);

        Self {
            inner: Arc::new(GateInner {
                settings,
                source: AsyncMutex::new(source),
                buffer: FrameBuffer::new(),
                health,
                pipeline,
                ledger,
                operator,
                snapshots,
                review: Mutex::new(Review {
                    state: GateState::Idle,
                    pending: None,
                    queue: VecDeque::new(),
                    session: 0,
                }),
            }),
            display: None,
            running: AsyncMutex::new(None),
        }
    }

    /// Attach a display sink, rendered from its own task while streaming
    pub fn with_display(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.display = Some(sink);
        self
    }

    pub fn state(&self) -> GateState {
        self.inner.review().state
    }

    /// Candidate currently shown to the operator
    pub fn pending_candidate(&self) -> Option<Candidate> {
        self.inner.review().pending.clone()
    }

    pub fn latest_frame(&self) -> Option<Frame> {
        self.inner.buffer.peek_latest()
    }

    pub fn health(&self) -> StreamHealth {
        self.inner.health.health()
    }

    /// Open the frame source and start the capture, processing and display tasks
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::InvalidState("Gate is already running".to_string()));
        }

        let settings = &self.inner.settings;
        self.inner
            .source
            .lock()
            .await
            .open(&settings.device, settings.width, settings.height)
            .await?;

        self.inner.buffer.clear();
        self.inner.health.reset();
        let session = {
            let mut review = self.inner.review();
            review.state = GateState::Streaming;
            review.pending = None;
            review.queue.clear();
            review.session += 1;
            review.session
        };

        let token = CancellationToken::new();
        let mut tasks = vec![
            tokio::spawn(capture_loop(self.inner.clone(), token.clone())),
            tokio::spawn(process_loop(self.inner.clone(), token.clone(), session)),
        ];
        if let Some(sink) = &self.display {
            tasks.push(tokio::spawn(display_loop(
                self.inner.clone(),
                sink.clone(),
                token.clone(),
            )));
        }

        *running = Some(Running { token, tasks });
        info!("Processing gate started on {}", settings.device);
        Ok(())
    }

    /// Stop all tasks and release the frame source.
    ///
    /// Pending and queued candidates are discarded without touching the ledger.
    /// Does nothing when the gate is idle.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(run) = running.take() else {
            return Ok(());
        };

        let discarded = {
            let mut review = self.inner.review();
            review.state = GateState::Idle;
            let discarded = review.pending.take().map_or(0, |_| 1) + review.queue.len();
            review.queue.clear();
            discarded
        };

        run.token.cancel();
        for task in run.tasks {
            if let Err(e) = task.await {
                error!("Gate task ended abnormally: {}", e);
            }
        }

        self.inner.source.lock().await.close().await;
        self.inner.buffer.clear();

        if discarded > 0 {
            info!("Discarded {} unconfirmed candidate(s)", discarded);
        }
        info!("Processing gate stopped");
        Ok(())
    }

    /// Accept the candidate under review with the operator's reading of the plate.
    ///
    /// The confirmed frame is stored as a snapshot when a directory is configured,
    /// then the sighting is recorded. The candidate is resolved either way; a
    /// ledger error is returned after the gate has moved on.
    pub async fn confirm(&self, corrected_text: &str) -> Result<EntryKind> {
        let (candidate, session) = self.inner.take_pending()?;

        let result = self.inner.commit(corrected_text, &candidate).await;
        if let Err(e) = &result {
            warn!("Confirmation of {} failed: {}", candidate.text, e);
        }

        self.inner.advance(session);
        result
    }

    /// Discard the candidate under review with no ledger effect
    pub async fn cancel(&self) -> Result<()> {
        let (candidate, session) = self.inner.take_pending()?;
        info!("Operator cancelled candidate {}", candidate.text);

        self.inner.advance(session);
        Ok(())
    }
}

impl GateInner {
    fn review(&self) -> MutexGuard<'_, Review> {
        match self.review.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_pending(&self) -> Result<(Candidate, u64)> {
        let mut review = self.review();
        if review.state != GateState::AwaitingConfirmation {
            return Err(Error::InvalidState(
                "No candidate is awaiting confirmation".to_string(),
            ));
        }

        let candidate = review.pending.take().ok_or_else(|| {
            Error::InvalidState("Candidate is already being resolved".to_string())
        })?;
        Ok((candidate, review.session))
    }

    async fn commit(&self, corrected_text: &str, candidate: &Candidate) -> Result<EntryKind> {
        let plate = normalize_plate(corrected_text)?;

        let image_path = match &self.snapshots {
            Some(store) => match store.save(&plate, &candidate.frame).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Failed to store snapshot for {}: {}", plate, e);
                    None
                }
            },
            None => None,
        };

        let kind = self
            .ledger
            .record_sighting(&plate, image_path.as_deref())
            .await?;

        if plate != normalize_plate(&candidate.text).unwrap_or_default() {
            info!("Operator corrected {} to {}", candidate.text, plate);
        }
        Ok(kind)
    }

    /// Surface the next queued candidate or resume streaming
    fn advance(&self, session: u64) {
        let next = {
            let mut review = self.review();
            if review.session != session || review.state != GateState::AwaitingConfirmation {
                return;
            }

            match review.queue.pop_front() {
                Some(next) => {
                    review.pending = Some(next.clone());
                    Some(next)
                }
                None => {
                    review.state = GateState::Streaming;
                    None
                }
            }
        };

        if let Some(candidate) = next {
            info!("Next queued candidate {}", candidate.text);
            self.operator.on_candidate(&candidate);
        }
    }

    /// Put the first candidate under review; returns it when the gate accepted it
    fn surface(&self, session: u64, candidates: Vec<Candidate>) -> Option<Candidate> {
        let mut review = self.review();
        if review.session != session || review.state != GateState::Streaming {
            return None;
        }

        let mut candidates = candidates.into_iter();
        let first = candidates.next()?;

        match self.settings.candidate_policy {
            CandidatePolicy::FirstOnly => {
                let dropped = candidates.count();
                if dropped > 0 {
                    debug!("Dropped {} further candidate(s) from the same frame", dropped);
                }
            }
            CandidatePolicy::Queue => review.queue.extend(candidates),
        }

        review.pending = Some(first.clone());
        review.state = GateState::AwaitingConfirmation;
        Some(first)
    }

    fn is_streaming(&self) -> bool {
        self.review().state == GateState::Streaming
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn capture_loop(inner: Arc<GateInner>, token: CancellationToken) {
    let mut ticker = ticker(inner.settings.capture_interval);
    let mut seq = 0u64;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = {
            let mut source = inner.source.lock().await;
            tokio::select! {
                _ = token.cancelled() => break,
                result = source.read_frame() => result,
            }
        };

        match result {
            Ok(image) => {
                seq += 1;
                inner.buffer.put(Frame::new(seq, image));
                inner.health.record_success();
            }
            Err(e) => {
                debug!("{}", e);
                inner.health.record_failure();
            }
        }
    }

    debug!("Capture task finished after {} frames", seq);
}

async fn process_loop(inner: Arc<GateInner>, token: CancellationToken, session: u64) {
    let mut ticker = ticker(inner.settings.process_interval);
    let mut last_seq = 0u64;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !inner.is_streaming() {
            continue;
        }

        let frame = match inner.buffer.peek_latest() {
            Some(frame) if frame.seq > last_seq => frame,
            _ => continue,
        };
        last_seq = frame.seq;

        let candidates = tokio::select! {
            _ = token.cancelled() => break,
            candidates = inner.pipeline.process(&frame) => candidates,
        };
        if candidates.is_empty() {
            continue;
        }

        if let Some(candidate) = inner.surface(session, candidates) {
            info!(
                "Plate {} detected in frame {}, awaiting confirmation",
                candidate.text, frame.seq
            );
            inner.operator.on_candidate(&candidate);
        }
    }

    debug!("Processing task finished");
}

async fn display_loop(inner: Arc<GateInner>, sink: Arc<dyn DisplaySink>, token: CancellationToken) {
    let mut ticker = ticker(inner.settings.display_interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Some(frame) = inner.buffer.peek_latest() {
            sink.render(&frame);
        }
    }

    debug!("Display task finished");
}
