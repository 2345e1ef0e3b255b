// crates/client/src/backend.rs
//! REST side of the backend: upload, session directory, job status.

use std::path::Path;

use crowdwatch_core::{
    DetailResponse, JobId, JobStatusReport, MonitorConfig, SessionDetail, SessionId,
    SessionSummary, UploadAccepted,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::error::ClientError;

/// Thin typed wrapper over the backend's REST endpoints.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base: Url,
}

impl BackendClient {
    pub fn new(config: &MonitorConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ClientError::transport("build HTTP client"))?;
        Ok(Self {
            http,
            base: config.backend.clone(),
        })
    }

    /// `POST /upload` with the file as multipart field `file`.
    pub async fn upload(&self, path: &Path) -> Result<UploadAccepted, ClientError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::InvalidUpload {
                path: path.to_path_buf(),
                reason: "path has no file name",
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(ClientError::InvalidUpload {
                path: path.to_path_buf(),
                reason: "file is empty",
            });
        }

        info!(%filename, size = bytes.len(), "uploading video");
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename));
        let resp = self
            .http
            .post(self.url(&["upload"]))
            .multipart(form)
            .send()
            .await
            .map_err(ClientError::transport("upload video"))?;
        let accepted: UploadAccepted = decode(resp, "upload video").await?;
        info!(job_id = %accepted.job_id, "upload accepted");
        Ok(accepted)
    }

    /// `GET /sessions`, in backend order.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ClientError> {
        let resp = self
            .http
            .get(self.url(&["sessions"]))
            .send()
            .await
            .map_err(ClientError::transport("list sessions"))?;
        let sessions: Vec<SessionSummary> = decode(resp, "list sessions").await?;
        debug!(count = sessions.len(), "sessions listed");
        Ok(sessions)
    }

    /// `GET /sessions/{id}`. An `{"error": ...}` body is a not-found, whatever
    /// the status code.
    pub async fn get_detail(&self, id: &SessionId) -> Result<SessionDetail, ClientError> {
        let resp = self
            .http
            .get(self.url(&["sessions", id.as_str()]))
            .send()
            .await
            .map_err(ClientError::transport("load session"))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::SessionNotFound { id: id.clone() });
        }
        match decode::<DetailResponse>(resp, "load session").await? {
            DetailResponse::Found(detail) => Ok(*detail),
            DetailResponse::Missing { error } => {
                debug!(session_id = %id, %error, "backend reported missing session");
                Err(ClientError::SessionNotFound { id: id.clone() })
            }
        }
    }

    /// `DELETE /sessions/{id}`.
    pub async fn delete_session(&self, id: &SessionId) -> Result<(), ClientError> {
        let resp = self
            .http
            .delete(self.url(&["sessions", id.as_str()]))
            .send()
            .await
            .map_err(ClientError::transport("delete session"))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::SessionNotFound { id: id.clone() });
        }
        check(resp, "delete session").await?;
        info!(session_id = %id, "session deleted");
        Ok(())
    }

    /// `GET /status/{job_id}`.
    pub async fn job_status(&self, job_id: &JobId) -> Result<JobStatusReport, ClientError> {
        let resp = self
            .http
            .get(self.url(&["status", job_id.as_str()]))
            .send()
            .await
            .map_err(ClientError::transport("check job status"))?;
        decode(resp, "check job status").await
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn check(resp: Response, operation: &'static str) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        operation,
        status,
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response, operation: &'static str) -> Result<T, ClientError> {
    check(resp, operation)
        .await?
        .json::<T>()
        .await
        .map_err(ClientError::transport(operation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowdwatch_core::{JobPhase, SessionStatus};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> BackendClient {
        let config = MonitorConfig::for_backend(&server.uri()).unwrap();
        BackendClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_list_sessions_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"session_id": "b", "filename": "b.mp4", "status": "processing",
                 "start_time": "2024-05-01T10:00:00"},
                {"session_id": "a", "filename": "a.mp4", "status": "completed",
                 "summary": {"peak_count": 9, "total_violations": 3},
                 "video_meta": {"VID_FPS": 25}},
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let sessions = client_for(&server).await.list_sessions().await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(sessions[0].status, SessionStatus::Processing);
        assert_eq!(sessions[1].metrics.peak_count, 9);
        assert_eq!(sessions[1].frame_rate(), 25.0);
        assert_eq!(sessions[0].frame_rate(), 30.0);
    }

    #[tokio::test]
    async fn test_detail_decodes_bundle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "session": {"session_id": "abc", "status": "completed"},
                "trends": [{"frame": 1, "human_count": 3, "violate_count": 1}],
                "abnormal_frames": [{"frame": 5, "cloudinary_url": "https://img/5.jpg",
                                     "human_count": 4, "timestamp": "2024-05-01T10:00:05"}],
                "abnormal_stats": {"original": {"mean": 1.5, "kurtosis": 0.1, "skew": 0.2}},
            })))
            .mount(&server)
            .await;

        let detail = client_for(&server)
            .await
            .get_detail(&SessionId::from("abc"))
            .await
            .unwrap();
        assert_eq!(detail.trends.len(), 1);
        assert_eq!(detail.trends[0].count, 3);
        assert_eq!(detail.abnormal_frames[0].frame_index, 5);
        assert_eq!(detail.abnormal_frames[0].evidence_image_ref, "https://img/5.jpg");
        assert!(detail.abnormal_stats.is_some());
    }

    #[tokio::test]
    async fn test_detail_error_body_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions/gone"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "Session not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .get_detail(&SessionId::from("gone"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_server_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db locked"))
            .mount(&server)
            .await;

        let err = client_for(&server).await.list_sessions().await.unwrap_err();
        match err {
            ClientError::Status { status, body, .. } => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(body, "db locked");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_session() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .await
            .delete_session(&SessionId::from("abc"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(body_string_contains("name=\"file\""))
            .and(body_string_contains("filename=\"clip.mp4\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"file_id": "J1", "filename": "clip.mp4"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"not really a video").unwrap();

        let accepted = client_for(&server).await.upload(&file).await.unwrap();
        assert_eq!(accepted.job_id, JobId::from("J1"));
        assert_eq!(accepted.filename, "clip.mp4");
    }

    #[tokio::test]
    async fn test_upload_rejects_missing_and_empty_files() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let missing = client.upload(&dir.path().join("nope.mp4")).await.unwrap_err();
        assert!(matches!(missing, ClientError::Io { .. }));

        let empty = dir.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();
        let err = client.upload(&empty).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpload { .. }));
    }

    #[tokio::test]
    async fn test_job_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/J1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed", "error": "decoder crashed"
            })))
            .mount(&server)
            .await;

        let report = client_for(&server)
            .await
            .job_status(&JobId::from("J1"))
            .await
            .unwrap();
        assert_eq!(report.status, JobPhase::Failed);
        assert_eq!(report.error.as_deref(), Some("decoder crashed"));
    }
}
