//! Orchestrator
//!
//! Wires capture output into the identification pipeline and identified
//! records into the history ledger, and follows the identity provider's
//! session signals.
//!
//! Each `identify` call carries its own cancellation token. A newer call
//! supersedes an older one, and `cancel_identify` or a sign-out abandons
//! the call in flight. An abandoned call's result is discarded: it is
//! neither appended nor recorded as the last result.

use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{CameraDevice, CaptureSession, DeviceSlot, UploadedFile};
use crate::error::IdentifyError;
use crate::ledger::{HistoryLedger, HistorySnapshot, LedgerError};
use crate::models::{AnalysisLevel, Identity, ImagePayload, SessionSignal};
use crate::pipeline::{IdentificationPipeline, IdentifyOutcome};
use crate::recognition::RecognitionService;

struct InFlight {
    invocation: Uuid,
    cancel: CancellationToken,
}

pub struct Orchestrator {
    pipeline: IdentificationPipeline,
    ledger: Arc<HistoryLedger>,
    camera: Arc<dyn CameraDevice>,
    device_slot: DeviceSlot,
    identity: RwLock<Option<Identity>>,
    in_flight: Mutex<Option<InFlight>>,
    last_result: RwLock<Option<IdentifyOutcome>>,
}

impl Orchestrator {
    pub fn new(
        recognizer: Arc<dyn RecognitionService>,
        ledger: Arc<HistoryLedger>,
        camera: Arc<dyn CameraDevice>,
    ) -> Self {
        let pipeline = IdentificationPipeline::new(recognizer, ledger.minter());
        Self {
            pipeline,
            ledger,
            camera,
            device_slot: DeviceSlot::new(),
            identity: RwLock::new(None),
            in_flight: Mutex::new(None),
            last_result: RwLock::new(None),
        }
    }

    pub fn ledger(&self) -> &Arc<HistoryLedger> {
        &self.ledger
    }

    pub fn device_slot(&self) -> &DeviceSlot {
        &self.device_slot
    }

    pub async fn current_identity(&self) -> Option<Identity> {
        self.identity.read().await.clone()
    }

    /// Apply an identity provider signal
    pub async fn handle_session_signal(&self, signal: SessionSignal) -> Result<(), LedgerError> {
        match signal {
            SessionSignal::SignedIn(identity) => self.sign_in(identity).await,
            SessionSignal::SignedOut => {
                self.sign_out().await;
                Ok(())
            }
        }
    }

    /// Bind to `identity` and open its history feed
    pub async fn sign_in(&self, identity: Identity) -> Result<(), LedgerError> {
        let previous = self.identity.write().await.replace(identity.clone());
        if previous.as_ref() != Some(&identity) {
            if let Some(previous) = &previous {
                info!(from = %previous, to = %identity, "Switching identity");
            }
            self.cancel_identify();
            *self.last_result.write().await = None;
        }

        info!(owner = %identity, "Signed in");
        self.ledger.subscribe(identity).await.map(|_| ())
    }

    /// Drop the identity, abandon any call in flight, clear the view
    pub async fn sign_out(&self) {
        let previous = self.identity.write().await.take();
        self.cancel_identify();
        *self.last_result.write().await = None;
        self.ledger.unsubscribe().await;
        if let Some(previous) = previous {
            info!(owner = %previous, "Signed out");
        }
    }

    /// New capture session bound to the shared camera slot
    pub fn capture_session(&self) -> CaptureSession {
        CaptureSession::new(self.camera.clone(), self.device_slot.clone())
    }

    /// Confirm the session's preview and identify it
    pub async fn identify_capture(
        &self,
        session: &mut CaptureSession,
        level: AnalysisLevel,
    ) -> Result<IdentifyOutcome, IdentifyError> {
        let image = session.confirm()?;
        self.identify(image, level).await
    }

    /// Validate an uploaded file and identify it
    ///
    /// An invalid file is rejected before the recognition service is called.
    pub async fn identify_upload(
        &self,
        file: UploadedFile,
        level: AnalysisLevel,
    ) -> Result<IdentifyOutcome, IdentifyError> {
        let image = self.capture_session().submit_file(file)?;
        self.identify(image, level).await
    }

    /// Identify `image` for the signed-in owner
    ///
    /// Identified records are appended to the ledger before success is
    /// reported; a failed append is `Persistence`, not success.
    pub async fn identify(
        &self,
        image: ImagePayload,
        level: AnalysisLevel,
    ) -> Result<IdentifyOutcome, IdentifyError> {
        let owner = self
            .current_identity()
            .await
            .ok_or(IdentifyError::SignedOut)?;

        let invocation = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let superseded = self.in_flight_slot().replace(InFlight {
            invocation,
            cancel: cancel.clone(),
        });
        if let Some(previous) = superseded {
            debug!(superseded = %previous.invocation, "Superseding identification in flight");
            previous.cancel.cancel();
        }

        let result = self.pipeline.identify(image, level, &owner, &cancel).await;
        self.finish_invocation(invocation);

        if cancel.is_cancelled() || self.current_identity().await.as_ref() != Some(&owner) {
            info!(invocation = %invocation, "Discarding result of abandoned identification");
            return Ok(IdentifyOutcome::Discarded);
        }

        let outcome = result?;
        if let IdentifyOutcome::Identified { record } = &outcome {
            if let Err(e) = self.ledger.append(record.clone()).await {
                warn!(record_id = %record.id, error = %e, "Identified component was not saved");
                return Err(IdentifyError::from(e));
            }
        }

        // Held while publishing so a sign-out cannot land between check and write
        let identity = self.identity.read().await;
        if cancel.is_cancelled() || identity.as_ref() != Some(&owner) {
            info!(
                invocation = %invocation,
                saved = outcome.record().is_some(),
                "Identity changed during save, result not shown"
            );
            return Ok(IdentifyOutcome::Discarded);
        }

        if !matches!(outcome, IdentifyOutcome::Discarded) {
            *self.last_result.write().await = Some(outcome.clone());
        }
        drop(identity);
        Ok(outcome)
    }

    /// Abandon the identification in flight, if any
    ///
    /// Returns true when a call was cancelled.
    pub fn cancel_identify(&self) -> bool {
        let in_flight = self.in_flight_slot().take();
        match in_flight {
            Some(in_flight) => {
                info!(invocation = %in_flight.invocation, "Identification cancelled");
                in_flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_identifying(&self) -> bool {
        self.in_flight_slot().is_some()
    }

    /// Most recent applied outcome (identified or uncertain)
    pub async fn last_result(&self) -> Option<IdentifyOutcome> {
        self.last_result.read().await.clone()
    }

    /// Clear the last result ("scan another")
    pub async fn reset(&self) {
        *self.last_result.write().await = None;
    }

    pub fn history(&self) -> watch::Receiver<HistorySnapshot> {
        self.ledger.watch()
    }

    fn in_flight_slot(&self) -> std::sync::MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish_invocation(&self, invocation: Uuid) {
        let mut slot = self.in_flight_slot();
        if slot.as_ref().map(|f| f.invocation) == Some(invocation) {
            *slot = None;
        }
    }
}
