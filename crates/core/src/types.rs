// crates/core/src/types.rs
//! Realtime data model: the per-frame state the aggregator owns.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend-assigned identifier scoping one video's processing run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a persisted session. The backend reuses the job id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&JobId> for SessionId {
    fn from(job: &JobId) -> Self {
        Self(job.0.clone())
    }
}

/// Opaque base64-encoded preview image. Carried, never decoded into pixels.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewImage(String);

impl PreviewImage {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Raw encoded image bytes (JPEG from the current backend).
    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let b64 = self
            .0
            .split_once(";base64,")
            .map_or(self.0.as_str(), |(_, data)| data);
        STANDARD.decode(b64.trim())
    }
}

impl fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreviewImage({} bytes b64)", self.0.len())
    }
}

/// The most recently observed frame. Replaced wholesale on every realtime event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub frame_index: u64,
    pub people_count: u64,
    pub violation_count: u64,
    pub is_abnormal: bool,
    pub is_restricted_entry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<PreviewImage>,
}

impl FrameSnapshot {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// One point of the live chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub frame_index: u64,
    pub people_count: u64,
    pub violation_count: u64,
    /// 1 when the frame was flagged abnormal, else 0.
    pub abnormal_flag: u8,
}

/// A retained abnormal frame, unique per frame index within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyEvidence {
    #[serde(rename = "frame", default, deserialize_with = "crate::lenient::count")]
    pub frame_index: u64,
    /// External image reference (URL). Opaque to this crate.
    #[serde(rename = "cloudinary_url", alias = "evidence_url", default)]
    pub evidence_image_ref: String,
    #[serde(rename = "human_count", default, deserialize_with = "crate::lenient::count")]
    pub people_count: u64,
    #[serde(rename = "violate_count", default, deserialize_with = "crate::lenient::count")]
    pub violation_count: u64,
    #[serde(default, deserialize_with = "crate::lenient::flag")]
    pub restricted_entry: bool,
    #[serde(rename = "timestamp", default, deserialize_with = "crate::lenient::timestamp")]
    pub observed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_snapshot_is_zero() {
        assert!(FrameSnapshot::default().is_zero());
        let snap = FrameSnapshot {
            people_count: 1,
            ..Default::default()
        };
        assert!(!snap.is_zero());
    }

    #[test]
    fn test_preview_decodes_plain_and_data_uri() {
        let plain = PreviewImage::new("aGVsbG8=");
        assert_eq!(plain.to_bytes().unwrap(), b"hello");
        let uri = PreviewImage::new("data:image/jpeg;base64,aGVsbG8=");
        assert_eq!(uri.to_bytes().unwrap(), b"hello");
        assert!(PreviewImage::new("%%%").to_bytes().is_err());
    }

    #[test]
    fn test_preview_debug_does_not_dump_payload() {
        let img = PreviewImage::new("aGVsbG8=");
        assert_eq!(format!("{img:?}"), "PreviewImage(8 bytes b64)");
    }

    #[test]
    fn test_evidence_from_detail_row() {
        let ev: AnomalyEvidence = serde_json::from_value(json!({
            "frame": 42,
            "cloudinary_url": "https://img.example/42.jpg",
            "human_count": 9,
            "violate_count": "2",
            "restricted_entry": 1,
            "timestamp": "2025-01-02T03:04:05"
        }))
        .unwrap();
        assert_eq!(ev.frame_index, 42);
        assert_eq!(ev.evidence_image_ref, "https://img.example/42.jpg");
        assert_eq!(ev.violation_count, 2);
        assert!(ev.restricted_entry);
        assert!(ev.observed_at.is_some());
    }

    #[test]
    fn test_job_id_display_and_session_conversion() {
        let job = JobId::from("J1");
        assert_eq!(job.to_string(), "J1");
        assert_eq!(SessionId::from(&job).as_str(), "J1");
    }
}
