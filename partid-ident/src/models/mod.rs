//! Data models for partid-ident

pub mod identity;
pub mod image;
pub mod record;

pub use identity::{Identity, SessionSignal};
pub use image::{ImageError, ImageFormat, ImagePayload};
pub use record::{
    AnalysisLevel, ComponentRecord, Confidence, HistoryEntrySummary, Pin, RecordId, Specification,
};
