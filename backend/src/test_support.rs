//! Hand-written fakes for the capture and transport ports.

use async_trait::async_trait;
use bytes::Bytes;
use shared::{SdpType, SessionDescription};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::ports::{
    CaptureBackend, CaptureError, CaptureHandle, CaptureOptions, FrameSink, PeerConnection,
    PeerTransport, RawFrame, StateEvents, TransportError,
};
use crate::application::session::SessionHandle;
use crate::domain::aggregates::ConnectionState;
use crate::infrastructure::driven::SessionRegistry;
use crate::domain::value_objects::{PixelFormat, SessionId, SourceLocator, TrackConfig, VideoFrame};

#[derive(Debug, Clone, Copy)]
enum CaptureMode {
    Endless,
    Broken,
    Unopenable,
}

#[derive(Default)]
struct CaptureCounters {
    opens: AtomicUsize,
    live: AtomicUsize,
}

/// Capture backend producing 2x2 BGR frames, or failing on demand
#[derive(Clone)]
pub struct FakeCapture {
    mode: CaptureMode,
    counters: Arc<CaptureCounters>,
}

impl FakeCapture {
    pub fn endless() -> Self {
        Self::with_mode(CaptureMode::Endless)
    }

    /// Opens fine, every read fails
    pub fn broken() -> Self {
        Self::with_mode(CaptureMode::Broken)
    }

    pub fn unopenable() -> Self {
        Self::with_mode(CaptureMode::Unopenable)
    }

    fn with_mode(mode: CaptureMode) -> Self {
        Self {
            mode,
            counters: Arc::default(),
        }
    }

    pub fn backend(&self) -> Arc<dyn CaptureBackend> {
        Arc::new(self.clone())
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Handles opened and not yet released
    pub fn live_handles(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for FakeCapture {
    fn open(
        &self,
        locator: &SourceLocator,
        _options: &CaptureOptions,
        _frame_rate: u32,
    ) -> Result<Box<dyn CaptureHandle>, CaptureError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if let CaptureMode::Unopenable = self.mode {
            return Err(CaptureError::Open {
                locator: locator.to_string(),
                reason: "no such file".to_string(),
            });
        }
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            mode: self.mode,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct FakeHandle {
    mode: CaptureMode,
    counters: Arc<CaptureCounters>,
}

impl CaptureHandle for FakeHandle {
    fn read(&mut self) -> Result<RawFrame, CaptureError> {
        match self.mode {
            CaptureMode::Endless => Ok(RawFrame {
                width: 2,
                height: 2,
                format: PixelFormat::Bgr24,
                data: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]),
            }),
            _ => Err(CaptureError::EndOfStream),
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Frame sink that records timestamps
#[derive(Default)]
pub struct RecordingSink {
    timestamps: Mutex<Vec<u64>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            timestamps: Mutex::default(),
            fail: true,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.timestamps.lock().unwrap().len()
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.timestamps.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn push_frame(&self, frame: VideoFrame) -> Result<(), TransportError> {
        if self.fail {
            return Err(TransportError::Media("track unbound".to_string()));
        }
        assert_eq!(frame.format, PixelFormat::Rgb24);
        self.timestamps.lock().unwrap().push(frame.pts);
        Ok(())
    }
}

/// Step at which a [`FakeConnection`] refuses to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    AddTrack,
    RemoteDescription,
    Answer,
    LocalDescription,
}

/// Transport that answers every offer and lets tests drive connectivity
#[derive(Default)]
pub struct FakeTransport {
    fail_at: Option<FailAt>,
    refuse_sessions: bool,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(step: FailAt) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_sessions: true,
            ..Self::default()
        }
    }

    pub fn connections(&self) -> Vec<Arc<FakeConnection>> {
        self.connections.lock().unwrap().clone()
    }

    pub fn connection(&self, id: &SessionId) -> Option<Arc<FakeConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_session(
        &self,
        id: &SessionId,
    ) -> Result<(Arc<dyn PeerConnection>, StateEvents), TransportError> {
        if self.refuse_sessions {
            return Err(TransportError::Negotiation("no ICE agent available".to_string()));
        }
        let (states, events) = mpsc::unbounded_channel();
        let connection = Arc::new(FakeConnection {
            id: id.clone(),
            fail_at: self.fail_at,
            states,
            sinks: Mutex::default(),
            local: Mutex::default(),
            closed: AtomicBool::new(false),
        });
        self.connections.lock().unwrap().push(Arc::clone(&connection));
        Ok((connection, events))
    }
}

pub struct FakeConnection {
    pub id: SessionId,
    fail_at: Option<FailAt>,
    states: mpsc::UnboundedSender<ConnectionState>,
    sinks: Mutex<Vec<Arc<RecordingSink>>>,
    local: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
}

impl FakeConnection {
    /// Push a connectivity state as the transport would
    pub fn emit(&self, state: ConnectionState) {
        let _ = self.states.send(state);
    }

    pub fn sink(&self) -> Option<Arc<RecordingSink>> {
        self.sinks.lock().unwrap().first().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self, step: FailAt) -> Result<(), TransportError> {
        if self.fail_at == Some(step) {
            return Err(TransportError::Negotiation(format!("{:?} rejected", step)));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn add_video_track(&self, _track: &TrackConfig) -> Result<Arc<dyn FrameSink>, TransportError> {
        self.check(FailAt::AddTrack)?;
        let sink = Arc::new(RecordingSink::default());
        self.sinks.lock().unwrap().push(Arc::clone(&sink));
        Ok(sink)
    }

    async fn set_remote_description(&self, offer: &SessionDescription) -> Result<(), TransportError> {
        self.check(FailAt::RemoteDescription)?;
        assert_eq!(offer.sdp_type, SdpType::Offer);
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.check(FailAt::Answer)?;
        Ok(SessionDescription::answer(format!(
            "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns={}\r\n",
            self.id
        )))
    }

    async fn set_local_description(&self, answer: &SessionDescription) -> Result<(), TransportError> {
        self.check(FailAt::LocalDescription)?;
        *self.local.lock().unwrap() = Some(answer.clone());
        // ICE starts once both descriptions are in place
        self.emit(ConnectionState::Connecting);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().unwrap().clone()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.emit(ConnectionState::Closed);
        }
        Ok(())
    }
}

const WAIT_STEP: Duration = Duration::from_millis(10);
const WAIT_STEPS: usize = 200;

/// Poll `check` until it holds, panicking after two seconds
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..WAIT_STEPS {
        if check() {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("condition not reached in time");
}

pub async fn wait_for_state(handle: &SessionHandle, state: ConnectionState) {
    for _ in 0..WAIT_STEPS {
        if handle.state().await == state {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("session {} never reached {}", handle.id(), state);
}

pub async fn wait_for_media(handle: &SessionHandle) {
    for _ in 0..WAIT_STEPS {
        if handle.is_media_running().await {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("media never started for session {}", handle.id());
}

pub async fn wait_until_unregistered(registry: &SessionRegistry, id: &SessionId) {
    for _ in 0..WAIT_STEPS {
        if !registry.contains(id).await {
            return;
        }
        tokio::time::sleep(WAIT_STEP).await;
    }
    panic!("session {} still registered", id);
}
