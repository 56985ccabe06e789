use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::ports::FrameSink;
use crate::domain::errors::BridgeError;
use crate::domain::value_objects::SessionId;

use super::source_track::SourceTrack;

/// Dedicated thread that pulls frames from one session's source and pushes
/// them into that session's transport sink.
///
/// The thread owns the [`SourceTrack`]; its capture handle is released when
/// the loop exits. Fatal media errors are reported on `faults` and end the
/// loop.
pub struct FramePump {
    session_id: SessionId,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl FramePump {
    pub fn spawn(
        session_id: SessionId,
        track: SourceTrack,
        sink: Arc<dyn FrameSink>,
        faults: mpsc::UnboundedSender<BridgeError>,
        cancel: CancellationToken,
        runtime: Handle,
    ) -> std::io::Result<Self> {
        let loop_id = session_id.clone();
        let loop_cancel = cancel.clone();
        let source = track.locator().to_string();
        let thread = std::thread::Builder::new()
            .name(format!("frame-pump-{}", short_id(&session_id)))
            .spawn(move || run(loop_id, track, sink, faults, loop_cancel, runtime))?;

        info!(session = %session_id, "Frame pump started on {}", source);

        Ok(Self {
            session_id,
            cancel,
            thread: Some(thread),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel the loop and wait for the thread to exit.
    ///
    /// Returns once the capture handle has been released. A read that is in
    /// flight finishes (bounded by the capture I/O timeout) but its frame is
    /// discarded.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let Some(thread) = self.thread.take() else {
            return;
        };

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => debug!(session = %self.session_id, "Frame pump joined"),
            Ok(Err(_)) => error!(session = %self.session_id, "Frame pump thread panicked"),
            Err(e) => error!(session = %self.session_id, "Failed to join frame pump: {}", e),
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        // Detached pumps still stop; nobody waits for them
        self.cancel.cancel();
    }
}

fn run(
    session_id: SessionId,
    mut track: SourceTrack,
    sink: Arc<dyn FrameSink>,
    faults: mpsc::UnboundedSender<BridgeError>,
    cancel: CancellationToken,
    runtime: Handle,
) {
    let period = track.frame_period();
    let mut deadline = Instant::now();
    let mut frames: u64 = 0;

    while !cancel.is_cancelled() {
        let frame = match track.produce_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(session = %session_id, "Source failed: {}", e);
                let _ = faults.send(e);
                break;
            }
        };

        // A frame read while the session was closing is never delivered
        if cancel.is_cancelled() {
            break;
        }

        if let Err(e) = runtime.block_on(sink.push_frame(frame)) {
            warn!(session = %session_id, "Failed to push frame: {}", e);
            let _ = faults.send(BridgeError::TransportFailure(e.to_string()));
            break;
        }

        frames += 1;
        if frames % 300 == 0 {
            debug!(session = %session_id, "Sent {} frames", frames);
        }

        deadline += period;
        let now = Instant::now();
        if deadline < now {
            // Fell behind (slow source); don't burst to catch up
            deadline = now;
            continue;
        }

        let cancelled = runtime.block_on(async {
            tokio::select! {
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep_until(deadline) => false,
            }
        });
        if cancelled {
            break;
        }
    }

    track.release();
    info!(session = %session_id, "Frame pump stopped after {} frames", frames);
}

fn short_id(id: &SessionId) -> &str {
    let s = id.as_str();
    s.get(..8).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::TrackConfig;
    use crate::test_support::{FakeCapture, RecordingSink};
    use std::time::Duration;

    fn track(capture: &FakeCapture) -> SourceTrack {
        SourceTrack::open(
            capture.backend(),
            crate::domain::value_objects::SourceLocator::parse("clip.mp4").unwrap(),
            Default::default(),
            TrackConfig::video("session", 50),
        )
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pump_delivers_paced_frames_until_stopped() {
        let capture = FakeCapture::endless();
        let sink = Arc::new(RecordingSink::default());
        let (faults, mut fault_rx) = mpsc::unbounded_channel();

        let pump = FramePump::spawn(
            SessionId::generate(),
            track(&capture),
            sink.clone(),
            faults,
            CancellationToken::new(),
            Handle::current(),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        pump.stop().await;

        let delivered = sink.frame_count();
        assert!(delivered >= 3, "only {} frames delivered", delivered);
        // 50fps for 200ms is ~10 frames; pacing keeps us far below a busy loop
        assert!(delivered <= 20, "{} frames delivered, pacing is off", delivered);
        assert_eq!(capture.live_handles(), 0);
        assert!(fault_rx.try_recv().is_err());

        let pts = sink.timestamps();
        assert!(pts.windows(2).all(|w| w[1] == w[0] + 1800));

        // Nothing is produced after stop returns
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.frame_count(), delivered);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_source_failure_is_reported_and_ends_loop() {
        let capture = FakeCapture::broken();
        let sink = Arc::new(RecordingSink::default());
        let (faults, mut fault_rx) = mpsc::unbounded_channel();

        let pump = FramePump::spawn(
            SessionId::generate(),
            track(&capture),
            sink.clone(),
            faults,
            CancellationToken::new(),
            Handle::current(),
        )
        .unwrap();

        let fault = tokio::time::timeout(Duration::from_secs(2), fault_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(fault, BridgeError::SourceUnavailable { .. }));

        pump.stop().await;
        assert_eq!(sink.frame_count(), 0);
        // Initial open plus exactly one reopen
        assert_eq!(capture.opens(), 2);
        assert_eq!(capture.live_handles(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sink_failure_is_transport_failure() {
        let capture = FakeCapture::endless();
        let sink = Arc::new(RecordingSink::failing());
        let (faults, mut fault_rx) = mpsc::unbounded_channel();

        let pump = FramePump::spawn(
            SessionId::generate(),
            track(&capture),
            sink,
            faults,
            CancellationToken::new(),
            Handle::current(),
        )
        .unwrap();

        let fault = tokio::time::timeout(Duration::from_secs(2), fault_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(fault, BridgeError::TransportFailure(_)));
        pump.stop().await;
        assert_eq!(capture.live_handles(), 0);
    }
}
