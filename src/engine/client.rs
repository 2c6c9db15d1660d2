//! HTTP transport client for the cleaning engine.
//!
//! One method per remote operation, each a single request/response round
//! trip with no internal retry. Failures surface as `TransportError` with
//! the server's `detail` string when one was provided.

use crate::error::{SweepError, TransportError};
use crate::model::{
    AnalysisResponse, CleaningResult, ConfigureAck, ExportFormat, OperationSpec, PreviewResponse,
    Report, RunConfig,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::path::Path;

pub struct EngineClient {
    http: reqwest::Client,
    base_url: String,
}

impl EngineClient {
    pub fn new(cfg: &RunConfig) -> Result<Self, SweepError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Map non-2xx responses to a typed error, extracting the engine's
    /// `{"detail": ...}` body when present.
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = resp
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string));
        Err(TransportError {
            status: Some(status.as_u16()),
            detail,
        })
    }

    async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, TransportError> {
        let resp = Self::check(resp).await?;
        resp.json::<T>().await.map_err(TransportError::from)
    }

    /// `POST /upload` (multipart). The engine parses the file, analyzes it,
    /// and mints the session id threaded through every later call.
    pub async fn upload(&self, path: &Path) -> Result<AnalysisResponse, SweepError> {
        let contents = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("dataset")
            .to_string();
        let part = reqwest::multipart::Part::bytes(contents).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.url("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(TransportError::from)?;
        let analysis: AnalysisResponse = Self::parse_json(resp).await?;
        if analysis.session_id.is_empty() {
            return Err(TransportError {
                status: None,
                detail: Some("upload response missing session id".into()),
            }
            .into());
        }
        Ok(analysis)
    }

    /// `POST /configure`. With `auto_clean` the engine ignores `operations`,
    /// which then defaults to an empty sequence.
    pub async fn configure(
        &self,
        session_id: &str,
        auto_clean: bool,
        operations: &[OperationSpec],
    ) -> Result<ConfigureAck, SweepError> {
        let body = serde_json::json!({
            "session_id": session_id,
            "auto_clean": auto_clean,
            "operations": operations,
        });
        let resp = self
            .http
            .post(self.url("configure"))
            .json(&body)
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(Self::parse_json(resp).await?)
    }

    /// `POST /clean?session_id=...`. Valid only after a successful configure
    /// for the same session id.
    pub async fn clean(&self, session_id: &str) -> Result<CleaningResult, SweepError> {
        let resp = self
            .http
            .post(self.url("clean"))
            .query(&[("session_id", session_id)])
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(Self::parse_json(resp).await?)
    }

    /// `GET /report/{session_id}`. Valid only after a successful clean.
    pub async fn report(&self, session_id: &str) -> Result<Report, SweepError> {
        let resp = self
            .http
            .get(self.url(&format!("report/{session_id}")))
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(Self::parse_json(resp).await?)
    }

    /// `GET /preview/{session_id}?limit=N`. Off the critical path.
    pub async fn preview(&self, session_id: &str, limit: u32) -> Result<PreviewResponse, SweepError> {
        let resp = self
            .http
            .get(self.url(&format!("preview/{session_id}")))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(TransportError::from)?;
        Ok(Self::parse_json(resp).await?)
    }

    /// `POST /download/{session_id}/{format}` -> binary body. Empty-body
    /// detection is the export trigger's job; the transport only reports
    /// HTTP-level failures.
    pub async fn download(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> Result<Bytes, SweepError> {
        let resp = self
            .http
            .post(self.url(&format!("download/{session_id}/{}", format.as_path_str())))
            .send()
            .await
            .map_err(TransportError::from)?;
        let resp = Self::check(resp).await?;
        Ok(resp.bytes().await.map_err(TransportError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg(base_url: &str) -> RunConfig {
        RunConfig {
            base_url: base_url.to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent: "datasweep-cli/test".into(),
            export_format: ExportFormat::Csv,
            output_dir: None,
            download: true,
            preview_limit: 100,
        }
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = EngineClient::new(&cfg("http://localhost:8000/api/")).unwrap();
        assert_eq!(client.url("upload"), "http://localhost:8000/api/upload");
        assert_eq!(
            client.url("download/s-1/csv"),
            "http://localhost:8000/api/download/s-1/csv"
        );
    }

    #[test]
    fn url_builds_path_segments() {
        let client = EngineClient::new(&cfg("http://localhost:8000/api")).unwrap();
        assert_eq!(client.url("report/abc-123"), "http://localhost:8000/api/report/abc-123");
    }
}
