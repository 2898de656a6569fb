//! Capture session state machine
//!
//! ```text
//! Idle ──start──▶ DeviceActive ──freeze──▶ PreviewReady ──confirm──▶ Confirmed
//!  │                  │                      │   ▲
//!  │                  │                   retake │
//!  │                  │                      ▼   │
//!  │                  │                   Retaking (re-acquire → DeviceActive)
//!  │                  └──────cancel / acquisition failure──────▶ Aborted
//!  └──submit_file (valid)──▶ Confirmed
//! ```
//!
//! The camera lease lives inside the `DeviceActive` state value, so leaving
//! that state by any path (freeze, cancel, failure, or dropping the session)
//! stops the stream and frees the device exactly once.

pub mod camera;
pub mod device;
pub mod upload;

pub use camera::{HttpSnapshotCamera, NoCamera};
pub use device::{CameraDevice, CameraStream, DeviceError, DeviceLease, DeviceSlot};
pub use upload::{validate_upload, UploadedFile};

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::ImagePayload;

/// Capture session errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Camera denied, absent, busy or failed mid-stream
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),

    /// Uploaded file rejected; session stays Idle
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// Operation not allowed in the current phase
    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: CapturePhase,
    },
}

/// Why a session ended in `Aborted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    Cancelled,
    DeviceUnavailable(String),
}

/// Observable session phase, handed to the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum CapturePhase {
    Idle,
    DeviceActive,
    PreviewReady,
    Retaking,
    Confirmed,
    Aborted { reason: AbortReason },
}

impl CapturePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CapturePhase::Confirmed | CapturePhase::Aborted { .. })
    }
}

impl std::fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CapturePhase::Idle => "idle",
            CapturePhase::DeviceActive => "device active",
            CapturePhase::PreviewReady => "preview ready",
            CapturePhase::Retaking => "retaking",
            CapturePhase::Confirmed => "confirmed",
            CapturePhase::Aborted { .. } => "aborted",
        };
        f.write_str(name)
    }
}

/// Internal state; owns whatever resource the phase holds
enum State {
    Idle,
    DeviceActive(DeviceLease),
    PreviewReady(ImagePayload),
    Retaking,
    Confirmed,
    Aborted(AbortReason),
}

impl State {
    fn phase(&self) -> CapturePhase {
        match self {
            State::Idle => CapturePhase::Idle,
            State::DeviceActive(_) => CapturePhase::DeviceActive,
            State::PreviewReady(_) => CapturePhase::PreviewReady,
            State::Retaking => CapturePhase::Retaking,
            State::Confirmed => CapturePhase::Confirmed,
            State::Aborted(reason) => CapturePhase::Aborted {
                reason: reason.clone(),
            },
        }
    }
}

/// One image-acquisition attempt, via camera or file
pub struct CaptureSession {
    session_id: Uuid,
    camera: Arc<dyn CameraDevice>,
    slot: DeviceSlot,
    state: State,
    phase_tx: watch::Sender<CapturePhase>,
}

impl CaptureSession {
    pub fn new(camera: Arc<dyn CameraDevice>, slot: DeviceSlot) -> Self {
        let (phase_tx, _) = watch::channel(CapturePhase::Idle);
        Self {
            session_id: Uuid::new_v4(),
            camera,
            slot,
            state: State::Idle,
            phase_tx,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> CapturePhase {
        self.state.phase()
    }

    /// Frozen frame awaiting confirm or retake
    pub fn preview(&self) -> Option<&ImagePayload> {
        match &self.state {
            State::PreviewReady(image) => Some(image),
            _ => None,
        }
    }

    /// Observe phase changes (including the transient `Retaking`)
    pub fn watch_phase(&self) -> watch::Receiver<CapturePhase> {
        self.phase_tx.subscribe()
    }

    /// Acquire the camera: Idle → DeviceActive, or → Aborted on failure
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("start"));
        }
        self.acquire().await
    }

    /// Freeze the current frame: DeviceActive → PreviewReady
    ///
    /// The stream is released here, before the preview is observable.
    pub async fn freeze(&mut self) -> Result<(), CaptureError> {
        let frame = match &mut self.state {
            State::DeviceActive(lease) => lease.capture_frame().await,
            _ => return Err(self.invalid("freeze")),
        };

        match frame {
            Ok(image) => {
                debug!(
                    session_id = %self.session_id,
                    format = %image.format(),
                    size = image.len(),
                    "Frame captured"
                );
                // Replacing the state drops the lease, stopping the stream
                self.transition(State::PreviewReady(image));
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Frame capture failed");
                self.transition(State::Aborted(AbortReason::DeviceUnavailable(e.to_string())));
                Err(CaptureError::DeviceUnavailable(e))
            }
        }
    }

    /// Discard the preview and re-acquire: PreviewReady → Retaking → DeviceActive
    pub async fn retake(&mut self) -> Result<(), CaptureError> {
        if !matches!(self.state, State::PreviewReady(_)) {
            return Err(self.invalid("retake"));
        }
        self.transition(State::Retaking);
        self.acquire().await
    }

    /// Accept the preview: PreviewReady → Confirmed, handing the image out
    pub fn confirm(&mut self) -> Result<ImagePayload, CaptureError> {
        match std::mem::replace(&mut self.state, State::Confirmed) {
            State::PreviewReady(image) => {
                self.publish();
                info!(session_id = %self.session_id, "Capture confirmed");
                Ok(image)
            }
            other => {
                self.state = other;
                Err(self.invalid("confirm"))
            }
        }
    }

    /// Abort from any non-terminal phase, releasing the camera if held
    ///
    /// Cancelling a terminal session is a no-op.
    pub fn cancel(&mut self) {
        if self.phase().is_terminal() {
            return;
        }
        self.transition(State::Aborted(AbortReason::Cancelled));
        info!(session_id = %self.session_id, "Capture cancelled");
    }

    /// File path: a valid image in Idle goes straight to Confirmed
    ///
    /// An invalid file leaves the session Idle so it can be resubmitted.
    pub fn submit_file(&mut self, file: UploadedFile) -> Result<ImagePayload, CaptureError> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("submit a file"));
        }

        match validate_upload(file) {
            Ok(image) => {
                self.transition(State::Confirmed);
                info!(session_id = %self.session_id, "Uploaded file accepted");
                Ok(image)
            }
            Err(message) => {
                info!(session_id = %self.session_id, reason = %message, "Uploaded file rejected");
                Err(CaptureError::InvalidFile(message))
            }
        }
    }

    async fn acquire(&mut self) -> Result<(), CaptureError> {
        match DeviceLease::acquire(&self.slot, self.camera.as_ref()).await {
            Ok(lease) => {
                self.transition(State::DeviceActive(lease));
                Ok(())
            }
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    device = self.camera.name(),
                    error = %e,
                    "Camera acquisition failed"
                );
                self.transition(State::Aborted(AbortReason::DeviceUnavailable(e.to_string())));
                Err(CaptureError::DeviceUnavailable(e))
            }
        }
    }

    fn transition(&mut self, next: State) {
        let from = self.state.phase();
        // Dropping the previous state releases any lease it held
        self.state = next;
        debug!(
            session_id = %self.session_id,
            from = %from,
            to = %self.state.phase(),
            "Capture phase transition"
        );
        self.publish();
    }

    fn publish(&self) {
        self.phase_tx.send_replace(self.state.phase());
    }

    fn invalid(&self, operation: &'static str) -> CaptureError {
        CaptureError::InvalidTransition {
            operation,
            phase: self.state.phase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageFormat;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Camera that opens successfully and counts stream stops
    struct TestCamera {
        opens: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        refuse: Option<DeviceError>,
    }

    struct TestStream {
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraDevice for TestCamera {
        fn name(&self) -> &str {
            "test"
        }

        async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
            if let Some(err) = &self.refuse {
                return Err(err.clone());
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TestStream {
                stops: Arc::clone(&self.stops),
            }))
        }
    }

    #[async_trait]
    impl CameraStream for TestStream {
        async fn capture_frame(&mut self) -> Result<ImagePayload, DeviceError> {
            ImagePayload::new(ImageFormat::Jpeg, vec![0xFF, 0xD8, 0xFF, 0xE0])
                .map_err(|e| DeviceError::Frame(e.to_string()))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn camera(refuse: Option<DeviceError>) -> (Arc<TestCamera>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));
        let cam = Arc::new(TestCamera {
            opens: Arc::clone(&opens),
            stops: Arc::clone(&stops),
            refuse,
        });
        (cam, opens, stops)
    }

    #[tokio::test]
    async fn test_camera_path_to_confirmed() {
        let (cam, _, stops) = camera(None);
        let slot = DeviceSlot::new();
        let mut session = CaptureSession::new(cam, slot.clone());

        session.start().await.unwrap();
        assert_eq!(session.phase(), CapturePhase::DeviceActive);
        assert_eq!(slot.active_holders(), 1);

        session.freeze().await.unwrap();
        assert_eq!(session.phase(), CapturePhase::PreviewReady);
        // Frame freeze releases the camera
        assert_eq!(slot.active_holders(), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        let image = session.confirm().unwrap();
        assert_eq!(image.format(), &ImageFormat::Jpeg);
        assert_eq!(session.phase(), CapturePhase::Confirmed);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_aborts() {
        let (cam, _, _) = camera(Some(DeviceError::PermissionDenied("denied".into())));
        let slot = DeviceSlot::new();
        let mut session = CaptureSession::new(cam, slot.clone());

        let err = session.start().await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::DeviceUnavailable(DeviceError::PermissionDenied(_))
        ));
        assert!(matches!(session.phase(), CapturePhase::Aborted { .. }));
        assert_eq!(slot.active_holders(), 0);
    }

    #[tokio::test]
    async fn test_retake_reacquires() {
        let (cam, opens, stops) = camera(None);
        let slot = DeviceSlot::new();
        let mut session = CaptureSession::new(cam, slot.clone());
        let phases = session.watch_phase();

        session.start().await.unwrap();
        session.freeze().await.unwrap();
        session.retake().await.unwrap();

        assert_eq!(session.phase(), CapturePhase::DeviceActive);
        assert_eq!(*phases.borrow(), CapturePhase::DeviceActive);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(slot.active_holders(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_and_is_idempotent() {
        let (cam, _, stops) = camera(None);
        let slot = DeviceSlot::new();
        let mut session = CaptureSession::new(cam, slot.clone());

        session.start().await.unwrap();
        session.cancel();
        session.cancel();

        assert_eq!(
            session.phase(),
            CapturePhase::Aborted {
                reason: AbortReason::Cancelled
            }
        );
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(slot.active_holders(), 0);
    }

    #[tokio::test]
    async fn test_dropping_active_session_releases() {
        let (cam, _, stops) = camera(None);
        let slot = DeviceSlot::new();
        {
            let mut session = CaptureSession::new(cam, slot.clone());
            session.start().await.unwrap();
        }
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(slot.active_holders(), 0);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let (cam, _, _) = camera(None);
        let mut session = CaptureSession::new(cam, DeviceSlot::new());

        assert!(matches!(
            session.confirm(),
            Err(CaptureError::InvalidTransition { .. })
        ));
        assert!(matches!(
            session.freeze().await,
            Err(CaptureError::InvalidTransition { .. })
        ));
        assert_eq!(session.phase(), CapturePhase::Idle);
    }

    #[tokio::test]
    async fn test_invalid_file_keeps_idle() {
        let (cam, opens, _) = camera(None);
        let mut session = CaptureSession::new(cam, DeviceSlot::new());

        let err = session
            .submit_file(UploadedFile::new(Some("text/csv".into()), b"a,b".to_vec()))
            .unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFile(_)));
        assert_eq!(session.phase(), CapturePhase::Idle);

        // Immediate resubmission allowed
        let image = session
            .submit_file(UploadedFile::new(
                Some("image/png".into()),
                vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            ))
            .unwrap();
        assert_eq!(image.format(), &ImageFormat::Png);
        assert_eq!(session.phase(), CapturePhase::Confirmed);
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }
}
