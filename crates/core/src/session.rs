// crates/core/src/session.rs
//! Backend-owned session resources: directory summaries, detail bundles,
//! upload acknowledgements and job status reports.
//!
//! Everything here is fetched, never computed locally. Decoding is lenient
//! so that one odd field does not hide a whole session from the directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lenient;
use crate::types::{AnomalyEvidence, JobId, SessionId};

/// Frame rate shown when the backend did not record one.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Completed,
    Failed,
    /// Any status this client does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Aggregate counters the backend stores on a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    #[serde(default, deserialize_with = "lenient::count")]
    pub peak_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_abnormal_frames: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_violations: u64,
    #[serde(default, deserialize_with = "lenient::float")]
    pub avg_count: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    #[serde(rename = "VID_FPS", default, deserialize_with = "lenient::float")]
    pub vid_fps: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub fps: Option<f64>,
}

/// One row of `GET /sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "summary", default)]
    pub metrics: SessionMetrics,
    #[serde(default)]
    pub video_meta: VideoMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionSummary {
    pub fn display_name(&self) -> &str {
        self.filename
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or("Untitled")
    }

    pub fn frame_rate(&self) -> f64 {
        self.video_meta
            .vid_fps
            .or(self.video_meta.fps)
            .unwrap_or(DEFAULT_FRAME_RATE)
    }
}

/// One stored per-frame row of a finished session.
///
/// Rows written by the processing pipeline and rows embedded in the final
/// analysis use different key names; both decode into this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTrendPoint")]
pub struct TrendPoint {
    pub frame: Option<u64>,
    pub count: u64,
    pub violations: u64,
    pub abnormal: bool,
    pub restricted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crowd_density_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_abnormal_score: Option<f64>,
}

#[derive(Deserialize)]
struct RawTrendPoint {
    #[serde(default, deserialize_with = "lenient::opt_count")]
    frame: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    time: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    count: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    human_count: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    violations: Option<u64>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    violate_count: Option<u64>,
    #[serde(default)]
    abnormal: Option<Value>,
    #[serde(default)]
    abnormal_activity: Option<Value>,
    #[serde(default)]
    restricted: Option<Value>,
    #[serde(default)]
    restricted_entry: Option<Value>,
    #[serde(default, deserialize_with = "lenient::float")]
    crowd_density_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    frame_abnormal_score: Option<f64>,
}

impl From<RawTrendPoint> for TrendPoint {
    fn from(raw: RawTrendPoint) -> Self {
        let flag = |primary: Option<Value>, fallback: Option<Value>| {
            primary
                .filter(|v| !v.is_null())
                .or(fallback)
                .as_ref()
                .is_some_and(lenient::value_to_flag)
        };
        Self {
            frame: raw.frame.or(raw.time),
            count: raw.count.or(raw.human_count).unwrap_or(0),
            violations: raw.violations.or(raw.violate_count).unwrap_or(0),
            abnormal: flag(raw.abnormal, raw.abnormal_activity),
            restricted: flag(raw.restricted, raw.restricted_entry),
            crowd_density_score: raw.crowd_density_score,
            frame_abnormal_score: raw.frame_abnormal_score,
        }
    }
}

/// Pre-computed distribution statistics for one pass over the abnormal scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsBlock {
    #[serde(default, deserialize_with = "lenient::float")]
    pub mean: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub kurtosis: Option<f64>,
    #[serde(default, deserialize_with = "lenient::float")]
    pub skew: Option<f64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub outliers_removed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbnormalStats {
    #[serde(default)]
    pub original: Option<StatsBlock>,
    #[serde(default)]
    pub cleaned: Option<StatsBlock>,
}

/// Full bundle returned by `GET /sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    pub session: SessionSummary,
    #[serde(default, deserialize_with = "lenient::list")]
    pub trends: Vec<TrendPoint>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub abnormal_frames: Vec<AnomalyEvidence>,
    #[serde(default, deserialize_with = "lenient::lossy")]
    pub abnormal_stats: Option<AbnormalStats>,
}

/// Body of `GET /sessions/{id}`. The backend answers an unknown id with a
/// success status and an `error` object instead of a 404.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DetailResponse {
    Found(Box<SessionDetail>),
    Missing { error: String },
}

/// Response of `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAccepted {
    #[serde(alias = "file_id")]
    pub job_id: JobId,
    #[serde(default)]
    pub filename: String,
}

/// Headline numbers of the final analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default, deserialize_with = "lenient::count")]
    pub peak_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_abnormal_frames: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<Value>,
}

/// Analysis payload attached to a completion. Unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalAnalysis {
    #[serde(default, deserialize_with = "lenient::lossy")]
    pub summary: Option<AnalysisSummary>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub trends: Vec<TrendPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Processing,
    Completed,
    Failed,
    NotFound,
    #[serde(other)]
    Unknown,
}

/// Response of `GET /status/{job_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::lossy",
        skip_serializing_if = "Option::is_none"
    )]
    pub analysis: Option<FinalAnalysis>,
    #[serde(
        default,
        deserialize_with = "lenient::lossy",
        skip_serializing_if = "Option::is_none"
    )]
    pub output_url_base: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_count")]
    pub frame: Option<u64>,
}
