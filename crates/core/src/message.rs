// crates/core/src/message.rs
//! Inbound stream messages and their decoding.
//!
//! Every frame on the streaming channel is a JSON object with a kind
//! discriminator and (usually) a job id. The kind lives in `type`; older
//! backends put it in `status` instead, so both are consulted in that order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MessageError;
use crate::lenient;
use crate::session::FinalAnalysis;
use crate::types::{JobId, PreviewImage};

/// Failure text used when the backend reports a failure without a reason.
pub const UNKNOWN_FAILURE: &str = "Unknown error";

/// Per-frame measurement pushed while a job is processing.
///
/// Every field is optional on the wire; missing counts read as 0 and missing
/// flags as false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealtimeTelemetry {
    #[serde(default, deserialize_with = "lenient::count")]
    pub frame: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub human_count: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub violate_count: u64,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub abnormal: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub restricted_entry: bool,
    #[serde(
        default,
        deserialize_with = "lenient::lossy",
        skip_serializing_if = "Option::is_none"
    )]
    pub frame_image: Option<PreviewImage>,
    #[serde(
        default,
        alias = "cloudinary_url",
        deserialize_with = "lenient::lossy",
        skip_serializing_if = "Option::is_none"
    )]
    pub evidence_url: Option<String>,
}

impl RealtimeTelemetry {
    /// Evidence reference when this frame qualifies as anomaly evidence.
    pub fn evidence_ref(&self) -> Option<&str> {
        if !self.abnormal {
            return None;
        }
        self.evidence_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// What a message asks the client to do.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Realtime(RealtimeTelemetry),
    Completed {
        analysis: Option<FinalAnalysis>,
        output_url_base: Option<String>,
    },
    Failed {
        error: String,
    },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Realtime(_) => "realtime",
            MessageBody::Completed { .. } => "completed",
            MessageBody::Failed { .. } => "failed",
        }
    }
}

/// A decoded stream message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub job_id: Option<JobId>,
    pub body: MessageBody,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(alias = "file_id", default)]
    job_id: Option<Value>,
}

#[derive(Deserialize)]
struct RealtimeFrame {
    #[serde(default)]
    data: Option<RealtimeTelemetry>,
}

/// A completion always gets through; an analysis that cannot be read is
/// dropped on its own.
#[derive(Deserialize)]
struct CompletedFrame {
    #[serde(default, deserialize_with = "lenient::lossy")]
    analysis: Option<FinalAnalysis>,
    #[serde(default, deserialize_with = "lenient::lossy")]
    output_url_base: Option<String>,
}

#[derive(Deserialize)]
struct FailedFrame {
    #[serde(default)]
    error: Option<Value>,
}

impl InboundMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_str(text).map_err(|source| MessageError::Json { source })?;
        Self::from_value(value)
    }

    /// Decode one binary frame. Only UTF-8 JSON is understood.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let text = std::str::from_utf8(bytes).map_err(|_| MessageError::NotText)?;
        Self::parse(text)
    }

    pub fn from_value(value: Value) -> Result<Self, MessageError> {
        let envelope: Envelope = serde_json::from_value(value.clone())
            .map_err(|source| MessageError::Json { source })?;

        let kind = envelope
            .kind
            .or(envelope.status)
            .ok_or(MessageError::MissingKind)?;

        let job_id = envelope.job_id.and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(JobId::new(s)),
            Value::Number(n) => Some(JobId::new(n.to_string())),
            _ => None,
        });

        let body = match kind.as_str() {
            "realtime" => {
                let frame: RealtimeFrame = serde_json::from_value(value)
                    .map_err(|e| MessageError::payload("realtime", e))?;
                MessageBody::Realtime(frame.data.unwrap_or_default())
            }
            "completed" => {
                let frame: CompletedFrame = serde_json::from_value(value)
                    .map_err(|e| MessageError::payload("completed", e))?;
                MessageBody::Completed {
                    analysis: frame.analysis,
                    output_url_base: frame.output_url_base,
                }
            }
            "failed" => {
                let frame: FailedFrame = serde_json::from_value(value)
                    .map_err(|e| MessageError::payload("failed", e))?;
                let error = match frame.error {
                    Some(Value::String(s)) if !s.is_empty() => s,
                    Some(Value::Null) | None => UNKNOWN_FAILURE.to_string(),
                    Some(other) => other.to_string(),
                };
                MessageBody::Failed { error }
            }
            _ => return Err(MessageError::UnknownKind { kind }),
        };

        Ok(Self { job_id, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_realtime() {
        let msg = InboundMessage::parse(
            r#"{"type":"realtime","job_id":"J1","data":{"human_count":5,"violate_count":1,"abnormal":false,"restricted_entry":true,"frame":1,"frame_image":"aGk="}}"#,
        )
        .unwrap();
        assert_eq!(msg.job_id, Some(JobId::from("J1")));
        match msg.body {
            MessageBody::Realtime(t) => {
                assert_eq!(t.frame, 1);
                assert_eq!(t.human_count, 5);
                assert_eq!(t.violate_count, 1);
                assert!(t.restricted_entry);
                assert_eq!(t.frame_image, Some(PreviewImage::new("aGk=")));
                assert_eq!(t.evidence_ref(), None);
            }
            other => panic!("expected realtime, got {other:?}"),
        }
    }

    #[test]
    fn test_legacy_field_names() {
        let msg = InboundMessage::parse(
            r#"{"file_id":"J9","type":"realtime","data":{"abnormal":true,"frame":7,"cloudinary_url":"https://x/7.jpg"}}"#,
        )
        .unwrap();
        assert_eq!(msg.job_id, Some(JobId::from("J9")));
        let MessageBody::Realtime(t) = msg.body else {
            panic!("expected realtime");
        };
        assert_eq!(t.evidence_ref(), Some("https://x/7.jpg"));
    }

    #[test]
    fn test_missing_telemetry_fields_default() {
        let msg = InboundMessage::parse(r#"{"type":"realtime","job_id":"J1","data":{}}"#).unwrap();
        assert_eq!(msg.body, MessageBody::Realtime(RealtimeTelemetry::default()));
        let msg = InboundMessage::parse(r#"{"type":"realtime","job_id":"J1"}"#).unwrap();
        assert_eq!(msg.body, MessageBody::Realtime(RealtimeTelemetry::default()));
    }

    #[test]
    fn test_completion_via_status_field() {
        let msg = InboundMessage::parse(
            r#"{"file_id":"J1","status":"completed","analysis":{"summary":{"peak_count":3}},"output_url_base":"/outputs/J1"}"#,
        )
        .unwrap();
        match msg.body {
            MessageBody::Completed {
                analysis,
                output_url_base,
            } => {
                assert_eq!(analysis.unwrap().summary.unwrap().peak_count, 3);
                assert_eq!(output_url_base.as_deref(), Some("/outputs/J1"));
            }
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn test_completion_survives_unreadable_analysis_fields() {
        let msg = InboundMessage::parse(
            r#"{"status":"completed","file_id":"J1","analysis":{"summary":{"peak_count":3},"trends":null}}"#,
        )
        .unwrap();
        let MessageBody::Completed { analysis, .. } = msg.body else {
            panic!("expected completed");
        };
        let analysis = analysis.unwrap();
        assert_eq!(analysis.summary.unwrap().peak_count, 3);
        assert!(analysis.trends.is_empty());

        let msg = InboundMessage::parse(
            r#"{"type":"completed","job_id":"J1","analysis":"done","output_url_base":42}"#,
        )
        .unwrap();
        assert_eq!(
            msg.body,
            MessageBody::Completed {
                analysis: None,
                output_url_base: None
            }
        );
    }

    #[test]
    fn test_odd_preview_keeps_the_rest_of_the_frame() {
        let msg = InboundMessage::parse(
            r#"{"type":"realtime","job_id":"J1","data":{"frame":4,"human_count":2,"frame_image":{"jpeg":true}}}"#,
        )
        .unwrap();
        let MessageBody::Realtime(t) = msg.body else {
            panic!("expected realtime");
        };
        assert_eq!((t.frame, t.human_count), (4, 2));
        assert!(t.frame_image.is_none());
    }

    #[test]
    fn test_failure_without_reason() {
        let msg = InboundMessage::parse(r#"{"type":"failed","job_id":"J1"}"#).unwrap();
        assert_eq!(
            msg.body,
            MessageBody::Failed {
                error: UNKNOWN_FAILURE.into()
            }
        );
    }

    #[test]
    fn test_type_wins_over_status() {
        let msg =
            InboundMessage::parse(r#"{"type":"realtime","status":"processing","job_id":"J1"}"#)
                .unwrap();
        assert_eq!(msg.body.kind(), "realtime");
    }

    #[test]
    fn test_rejects_unknown_and_malformed() {
        assert!(matches!(
            InboundMessage::parse(r#"{"type":"progress"}"#),
            Err(MessageError::UnknownKind { .. })
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"job_id":"J1"}"#),
            Err(MessageError::MissingKind)
        ));
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(MessageError::Json { .. })
        ));
        assert!(matches!(
            InboundMessage::parse("[1,2,3]"),
            Err(MessageError::Json { .. })
        ));
        assert!(matches!(
            InboundMessage::parse(r#"{"type":"realtime","data":"oops"}"#),
            Err(MessageError::Payload { kind: "realtime", .. })
        ));
        assert!(matches!(
            InboundMessage::parse_bytes(&[0xff, 0xfe]),
            Err(MessageError::NotText)
        ));
    }

    #[test]
    fn test_numeric_job_id_is_accepted() {
        let msg = InboundMessage::parse(r#"{"type":"failed","job_id":17,"error":"x"}"#).unwrap();
        assert_eq!(msg.job_id, Some(JobId::from("17")));
    }
}
