//! Camera device implementations
//!
//! - `HttpSnapshotCamera`: a network camera exposing a still-image URL
//! - `NoCamera`: stands in when no camera is configured; always refuses

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::device::{CameraDevice, CameraStream, DeviceError};
use crate::models::ImagePayload;

/// Default timeout for snapshot requests
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Camera backed by an HTTP snapshot endpoint
///
/// Opening probes the endpoint once; each frame capture fetches a fresh still.
pub struct HttpSnapshotCamera {
    http_client: Client,
    snapshot_url: String,
}

impl HttpSnapshotCamera {
    pub fn new(snapshot_url: impl Into<String>) -> Result<Self, DeviceError> {
        let http_client = Client::builder()
            .timeout(SNAPSHOT_TIMEOUT)
            .build()
            .map_err(|e| DeviceError::NoDevice(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            snapshot_url: snapshot_url.into(),
        })
    }
}

#[async_trait]
impl CameraDevice for HttpSnapshotCamera {
    fn name(&self) -> &str {
        "http-snapshot"
    }

    async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
        debug!(url = %self.snapshot_url, "Probing snapshot camera");

        let response = self
            .http_client
            .head(&self.snapshot_url)
            .send()
            .await
            .map_err(|e| DeviceError::NoDevice(format!("camera unreachable: {}", e)))?;

        check_status(response.status())?;

        Ok(Box::new(SnapshotStream {
            http_client: self.http_client.clone(),
            snapshot_url: self.snapshot_url.clone(),
            stopped: false,
        }))
    }
}

struct SnapshotStream {
    http_client: Client,
    snapshot_url: String,
    stopped: bool,
}

#[async_trait]
impl CameraStream for SnapshotStream {
    async fn capture_frame(&mut self) -> Result<ImagePayload, DeviceError> {
        if self.stopped {
            return Err(DeviceError::Frame("stream stopped".to_string()));
        }

        let response = self
            .http_client
            .get(&self.snapshot_url)
            .send()
            .await
            .map_err(|e| DeviceError::Frame(format!("snapshot request failed: {}", e)))?;

        check_status(response.status())?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeviceError::Frame(format!("snapshot body read failed: {}", e)))?;

        ImagePayload::from_mime(&content_type, bytes.to_vec()).map_err(|e| {
            warn!(content_type = %content_type, "Snapshot endpoint returned a non-image");
            DeviceError::Frame(e.to_string())
        })
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

fn check_status(status: StatusCode) -> Result<(), DeviceError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DeviceError::PermissionDenied(
            format!("camera returned {}", status),
        )),
        _ => Err(DeviceError::NoDevice(format!("camera returned {}", status))),
    }
}

/// Placeholder device used when no camera is configured
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    fn name(&self) -> &str {
        "none"
    }

    async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
        Err(DeviceError::NoDevice(
            "no camera configured; use file upload".to_string(),
        ))
    }
}
