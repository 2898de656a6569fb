//! Camera device contract and the exclusive device slot
//!
//! The camera is a shared exclusive resource. `DeviceSlot` hands out at most
//! one `DeviceLease` at a time and fails fast when it is already held. A
//! lease stops its stream and frees the slot exactly once, when it is
//! released or dropped, whichever comes first.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::models::ImagePayload;

/// Camera acquisition or frame failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// User or platform refused access to the camera
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No usable camera device
    #[error("no camera device: {0}")]
    NoDevice(String),

    /// Another capture session holds the camera
    #[error("camera is in use by another capture session")]
    Busy,

    /// Stream was open but a still frame could not be taken
    #[error("failed to capture frame: {0}")]
    Frame(String),
}

/// A camera that can be opened into a live stream
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Device name for logging
    fn name(&self) -> &str;

    /// Acquire the device and start streaming
    async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError>;
}

/// A live camera stream
#[async_trait]
pub trait CameraStream: Send {
    /// Freeze the current frame into a still image
    async fn capture_frame(&mut self) -> Result<ImagePayload, DeviceError>;

    /// Stop the stream; called exactly once by the owning lease
    fn stop(&mut self);
}

/// Single-holder guard for the camera
#[derive(Clone)]
pub struct DeviceSlot {
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
}

impl DeviceSlot {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserve the slot without waiting
    ///
    /// Returns `DeviceError::Busy` when another session holds it.
    pub fn try_reserve(&self) -> Result<SlotReservation, DeviceError> {
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| DeviceError::Busy)?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(SlotReservation {
            _permit: permit,
            active: Arc::clone(&self.active),
        })
    }

    /// Number of live reservations (0 or 1)
    pub fn active_holders(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for DeviceSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Held slot; freed on drop
pub struct SlotReservation {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open camera stream bound to a slot reservation
pub struct DeviceLease {
    stream: Option<Box<dyn CameraStream>>,
    reservation: Option<SlotReservation>,
    device_name: String,
}

impl DeviceLease {
    /// Reserve the slot, then open the device
    ///
    /// On any failure the reservation is dropped before returning.
    pub async fn acquire(
        slot: &DeviceSlot,
        device: &dyn CameraDevice,
    ) -> Result<Self, DeviceError> {
        let reservation = slot.try_reserve()?;
        let stream = device.open().await?;
        debug!(device = device.name(), "Camera stream acquired");
        Ok(Self {
            stream: Some(stream),
            reservation: Some(reservation),
            device_name: device.name().to_string(),
        })
    }

    /// Freeze one frame
    pub async fn capture_frame(&mut self) -> Result<ImagePayload, DeviceError> {
        match self.stream.as_mut() {
            Some(stream) => stream.capture_frame().await,
            None => Err(DeviceError::Frame("stream already stopped".to_string())),
        }
    }

    /// Stop the stream and free the slot
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!(device = %self.device_name, "Camera stream stopped");
        }
        self.reservation.take();
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageFormat;

    struct CountingCamera {
        stops: Arc<AtomicUsize>,
    }

    struct CountingStream {
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CameraDevice for CountingCamera {
        fn name(&self) -> &str {
            "counting"
        }

        async fn open(&self) -> Result<Box<dyn CameraStream>, DeviceError> {
            Ok(Box::new(CountingStream {
                stops: Arc::clone(&self.stops),
            }))
        }
    }

    #[async_trait]
    impl CameraStream for CountingStream {
        async fn capture_frame(&mut self) -> Result<ImagePayload, DeviceError> {
            ImagePayload::new(ImageFormat::Jpeg, vec![0xFF, 0xD8, 0xFF])
                .map_err(|e| DeviceError::Frame(e.to_string()))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_slot_is_exclusive() {
        let slot = DeviceSlot::new();
        let first = slot.try_reserve().unwrap();
        assert_eq!(slot.active_holders(), 1);
        assert!(matches!(slot.try_reserve(), Err(DeviceError::Busy)));

        drop(first);
        assert_eq!(slot.active_holders(), 0);
        assert!(slot.try_reserve().is_ok());
    }

    #[tokio::test]
    async fn test_release_then_drop_stops_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let camera = CountingCamera {
            stops: Arc::clone(&stops),
        };
        let slot = DeviceSlot::new();

        let mut lease = DeviceLease::acquire(&slot, &camera).await.unwrap();
        assert!(lease.capture_frame().await.is_ok());
        lease.release();

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(slot.active_holders(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let stops = Arc::new(AtomicUsize::new(0));
        let camera = CountingCamera {
            stops: Arc::clone(&stops),
        };
        let slot = DeviceSlot::new();

        {
            let _lease = DeviceLease::acquire(&slot, &camera).await.unwrap();
            assert_eq!(slot.active_holders(), 1);
        }

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(slot.active_holders(), 0);
    }
}
