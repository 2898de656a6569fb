//! Test helper utilities
//!
//! Shared doubles for partid-ident integration tests: a scripted
//! recognition service, a counting camera, image fixtures and an
//! in-memory ledger.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use partid_common::events::{EventBus, PartidEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch, Notify};
use uuid::Uuid;

use partid_ident::capture::{CameraDevice, CameraStream, DeviceError};
use partid_ident::ledger::{
    HistoryLedger, HistorySnapshot, LedgerError, LedgerStore, RecordIdMinter, SqliteLedgerStore,
};
use partid_ident::models::{
    AnalysisLevel, ComponentRecord, Confidence, Identity, ImageFormat, ImagePayload, RecordId,
};
use partid_ident::recognition::{RecognitionError, RecognitionRequest, RecognitionService};
use partid_ident::Orchestrator;

/// Minimal JPEG header (SOI + APP0/JFIF)
pub const JPEG_BYTES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xD9,
];

pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52,
];

pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n";

pub fn jpeg() -> ImagePayload {
    ImagePayload::new(ImageFormat::Jpeg, JPEG_BYTES.to_vec()).unwrap()
}

pub fn identity(id: &str) -> Identity {
    Identity::new(id).unwrap()
}

pub fn basic_answer(name: &str, confidence: &str) -> String {
    serde_json::json!({
        "name": name,
        "type": "Integrated Circuit",
        "commonUsage": format!("{} is used in test circuits", name),
        "confidence": confidence,
    })
    .to_string()
}

pub fn uncertain_answer(explanation: &str) -> String {
    serde_json::json!({
        "name": "",
        "type": "",
        "commonUsage": explanation,
        "confidence": "Uncertain",
    })
    .to_string()
}

pub fn advanced_answer(name: &str) -> String {
    serde_json::json!({
        "name": name,
        "type": "Microcontroller",
        "description": "8-bit AVR microcontroller",
        "manufacturer": "Microchip",
        "packageType": "DIP-28",
        "applicationCategory": "Embedded",
        "keyFeatures": ["32KB flash", "2KB SRAM"],
        "substitutes": ["ATmega168"],
        "functionalBlocks": ["CPU", "ADC", "USART"],
        "pinout": [
            {"pinNumber": 1, "pinName": "RESET", "pinDescription": "Active-low reset"},
            {"pinNumber": 7, "pinName": "VCC", "pinDescription": "Supply"}
        ],
        "specifications": [
            {"specName": "Supply voltage", "specValue": "1.8-5.5V"},
            {"specName": "Clock", "specValue": "20MHz"}
        ],
        "commonUsage": "Arduino Uno",
        "confidence": "High",
        "datasheetUrl": "https://example.com/atmega328p.pdf"
    })
    .to_string()
}

/// Identified Basic record created at `created_at`
pub fn record_at(owner: &Identity, name: &str, created_at: DateTime<Utc>) -> ComponentRecord {
    ComponentRecord {
        id: RecordId::from_uuid(Uuid::now_v7()),
        owner_id: owner.clone(),
        name: name.to_string(),
        category: "Resistor".to_string(),
        description: String::new(),
        manufacturer: String::new(),
        package_type: String::new(),
        application_category: String::new(),
        key_features: Vec::new(),
        substitutes: Vec::new(),
        functional_blocks: Vec::new(),
        pinout: Vec::new(),
        specifications: Vec::new(),
        common_usage: "Current limiting".to_string(),
        confidence: Confidence::High,
        datasheet_url: String::new(),
        analysis_level: AnalysisLevel::Basic,
        image: jpeg(),
        created_at,
    }
}

/// Identified record stamped by `minter`
pub fn minted_record(minter: &RecordIdMinter, owner: &Identity, name: &str) -> ComponentRecord {
    let (id, created_at) = minter.mint();
    ComponentRecord {
        id,
        ..record_at(owner, name, created_at)
    }
}

enum Script {
    Answer(Result<String, RecognitionError>),
    /// Held until the test sends the answer
    Gate(oneshot::Receiver<Result<String, RecognitionError>>),
}

/// Recognition service answering from a script, one entry per call
#[derive(Default)]
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<RecognitionRequest>>,
    calls: AtomicUsize,
    called: Notify,
}

impl ScriptedRecognizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_answer(&self, answer: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .push_back(Script::Answer(Ok(answer.into())));
    }

    pub fn push_error(&self, error: RecognitionError) {
        self.script
            .lock()
            .unwrap()
            .push_back(Script::Answer(Err(error)));
    }

    /// Next call blocks until the returned sender fires
    pub fn push_gate(&self) -> oneshot::Sender<Result<String, RecognitionError>> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().push_back(Script::Gate(rx));
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn levels(&self) -> Vec<AnalysisLevel> {
        self.requests.lock().unwrap().iter().map(|r| r.level).collect()
    }

    pub fn last_request(&self) -> Option<RecognitionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Resolves once a call has started
    pub async fn wait_for_call(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.called.notified())
            .await
            .expect("recognizer was never called");
    }
}

#[async_trait]
impl RecognitionService for ScriptedRecognizer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn recognize(&self, request: RecognitionRequest) -> Result<String, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        self.called.notify_one();

        match next {
            Some(Script::Answer(answer)) => answer,
            Some(Script::Gate(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(RecognitionError::Unreachable("gate dropped".into()))),
            None => Err(RecognitionError::Unreachable("script exhausted".into())),
        }
    }
}

/// Camera that counts opens and stream stops
#[derive(Default)]
pub struct FakeCamera {
    pub opens: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    refuse: Mutex<Option<DeviceError>>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing(error: DeviceError) -> Arc<Self> {
        let camera = Self::default();
        *camera.refuse.lock().unwrap() = Some(error);
        Arc::new(camera)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    fn name(&self) -> &str {
        "fake"
    }

    async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
        if let Some(error) = self.refuse.lock().unwrap().clone() {
            return Err(error);
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            stops: self.stops.clone(),
        }))
    }
}

struct FakeStream {
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl CameraStream for FakeStream {
    async fn capture_frame(&mut self) -> Result<ImagePayload, DeviceError> {
        Ok(jpeg())
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Store wrapper whose inserts can be made to fail or to stall
pub struct FlakyStore {
    inner: SqliteLedgerStore,
    fail_inserts: AtomicBool,
    pub inserts: AtomicUsize,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    insert_started: Notify,
}

impl FlakyStore {
    /// Next insert waits until the returned sender fires (or is dropped)
    pub fn hold_next_insert(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    /// Resolves once an insert has started
    pub async fn wait_for_insert(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.insert_started.notified())
            .await
            .expect("store insert was never called");
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &SqliteLedgerStore {
        &self.inner
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn insert(&self, record: &ComponentRecord) -> Result<(), LedgerError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(LedgerError::Serialization("injected failure".to_string()));
        }
        let hold = self.hold.lock().unwrap().take();
        self.insert_started.notify_one();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(record).await
    }

    async fn load_owner(&self, owner: &Identity) -> Result<Vec<ComponentRecord>, LedgerError> {
        self.inner.load_owner(owner).await
    }

    async fn load_record(
        &self,
        owner: &Identity,
        id: RecordId,
    ) -> Result<Option<ComponentRecord>, LedgerError> {
        self.inner.load_record(owner, id).await
    }

    fn changes(&self) -> broadcast::Receiver<PartidEvent> {
        self.inner.changes()
    }
}

pub async fn memory_store() -> SqliteLedgerStore {
    let pool = partid_common::db::init_memory_database().await.unwrap();
    SqliteLedgerStore::new(pool, EventBus::new(100)).await.unwrap()
}

pub async fn flaky_store() -> Arc<FlakyStore> {
    Arc::new(FlakyStore {
        inner: memory_store().await,
        fail_inserts: AtomicBool::new(false),
        inserts: AtomicUsize::new(0),
        hold: Mutex::new(None),
        insert_started: Notify::new(),
    })
}

/// Fully wired orchestrator over test doubles
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub camera: Arc<FakeCamera>,
    pub store: Arc<FlakyStore>,
    pub ledger: Arc<HistoryLedger>,
}

pub async fn harness() -> Harness {
    harness_with_camera(FakeCamera::new()).await
}

pub async fn harness_with_camera(camera: Arc<FakeCamera>) -> Harness {
    let recognizer = ScriptedRecognizer::new();
    let store = flaky_store().await;
    let ledger = Arc::new(HistoryLedger::new(store.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        recognizer.clone(),
        ledger.clone(),
        camera.clone(),
    ));
    Harness {
        orchestrator,
        recognizer,
        camera,
        store,
        ledger,
    }
}

/// Wait until the published view satisfies `predicate`
pub async fn wait_for_view<F>(rx: &mut watch::Receiver<HistorySnapshot>, predicate: F) -> HistorySnapshot
where
    F: FnMut(&HistorySnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("view never reached the expected state")
        .expect("view publisher dropped")
        .clone()
}

/// Strictly `created_at` descending and id-unique
pub fn assert_view_invariants(records: &[ComponentRecord]) {
    for pair in records.windows(2) {
        assert!(
            pair[0].created_at > pair[1].created_at,
            "view not strictly descending: {} then {}",
            pair[0].created_at,
            pair[1].created_at
        );
    }
    let mut ids: Vec<_> = records.iter().map(|r| r.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), records.len(), "duplicate ids in view");
}
