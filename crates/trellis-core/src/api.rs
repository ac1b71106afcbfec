use std::fmt;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use trellis_wire::{ApiError, TaskEnvelope, TaskPayload};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::task::{Task, TaskId};

const CSRF_HEADER: &str = "X-CSRFToken";
const CSRF_COOKIE: &str = "csrftoken";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Remote task collection. Any error means the call did not take effect.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Task>>;

    /// Returns the task as stored by the server, with its assigned id.
    async fn create(&self, task: &Task) -> anyhow::Result<Task>;

    async fn update(&self, task: &Task) -> anyhow::Result<Task>;

    async fn delete(&self, id: &TaskId) -> anyhow::Result<()>;
}

/// A non-2xx answer from the task API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub action: String,
    pub status: u16,
    pub detail: String,
}

impl StatusError {
    /// The server refused this payload. Sending it again gets the same
    /// answer; timeouts and rate limits are not refusals.
    pub fn is_rejection(&self) -> bool {
        (400..500).contains(&self.status) && !matches!(self.status, 408 | 429)
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: server returned HTTP {}: {}",
            self.action, self.status, self.detail
        )
    }
}

impl std::error::Error for StatusError {}

/// Whether `err` is a refusal from the server rather than a transport
/// failure or a 5xx.
pub fn is_rejection(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StatusError>()
        .is_some_and(StatusError::is_rejection)
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub csrf_token: Option<String>,
    pub timeout: Duration,
}

impl ApiSettings {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let base_url = cfg
            .get("api.base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let csrf_token = cfg.get("api.csrf_token").or_else(|| {
            cfg.get("api.cookie")
                .and_then(|cookie| csrf_from_cookie(&cookie))
        });

        let timeout = match cfg.get("api.timeout") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|err| anyhow!("invalid api.timeout {raw:?}: {err}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            csrf_token,
            timeout: Duration::from_secs(timeout),
        })
    }
}

/// Pulls the anti-forgery token out of a `Cookie` header value.
pub fn csrf_from_cookie(cookie: &str) -> Option<String> {
    cookie.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == CSRF_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
}

impl HttpTaskApi {
    pub fn new(settings: ApiSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed building HTTP client for task API")?;

        info!(
            base_url = %settings.base_url,
            has_csrf = settings.csrf_token.is_some(),
            "configured task API client"
        );

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            csrf_token: settings.csrf_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/tasks/{path}", self.base_url)
    }

    fn with_csrf(&self, request: RequestBuilder) -> RequestBuilder {
        match self.csrf_token.as_deref() {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    /// Whether the server answers at all. Any HTTP status counts.
    #[instrument(skip(self))]
    pub async fn probe(&self) -> bool {
        match self
            .client
            .get(self.url(""))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => {
                debug!(status = %response.status(), "connectivity probe answered");
                true
            }
            Err(error) => {
                debug!(%error, "connectivity probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    #[instrument(skip(self))]
    async fn list(&self) -> anyhow::Result<Vec<Task>> {
        let response = self
            .client
            .get(self.url(""))
            .send()
            .await
            .context("failed requesting task list")?;
        let response = ensure_success(response, "list tasks").await?;

        let payloads: Vec<TaskPayload> = response
            .json()
            .await
            .context("failed decoding task list")?;
        debug!(count = payloads.len(), "fetched task list");

        payloads.into_iter().map(Task::try_from).collect()
    }

    #[instrument(skip(self, task), fields(id = %task.id))]
    async fn create(&self, task: &Task) -> anyhow::Result<Task> {
        let request = self.client.post(self.url("create/")).json(&task.create_body());
        let response = self
            .with_csrf(request)
            .send()
            .await
            .context("failed sending task to server")?;
        let response = ensure_success(response, "create task").await?;

        let envelope: TaskEnvelope = response
            .json()
            .await
            .context("failed decoding create response")?;
        info!(server_id = %envelope.task.id, "task created on server");
        Task::try_from(envelope.task)
    }

    #[instrument(skip(self, task), fields(id = %task.id))]
    async fn update(&self, task: &Task) -> anyhow::Result<Task> {
        let TaskId::Remote(id) = &task.id else {
            return Err(anyhow!("task {} has no server id yet", task.id));
        };

        let request = self
            .client
            .put(self.url(&format!("update/{id}/")))
            .json(&task.update_body());
        let response = self
            .with_csrf(request)
            .send()
            .await
            .context("failed sending task update to server")?;
        let response = ensure_success(response, "update task").await?;

        let body = response
            .text()
            .await
            .context("failed reading update response")?;
        match serde_json::from_str::<TaskEnvelope>(&body) {
            Ok(envelope) => Task::try_from(envelope.task),
            Err(error) => {
                debug!(%error, "update response had no task envelope");
                Ok(task.clone())
            }
        }
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete(&self, id: &TaskId) -> anyhow::Result<()> {
        let TaskId::Remote(remote) = id else {
            return Err(anyhow!("task {id} has no server id yet"));
        };

        let request = self.client.delete(self.url(&format!("delete/{remote}/")));
        let response = self
            .with_csrf(request)
            .send()
            .await
            .context("failed sending delete to server")?;
        ensure_success(response, "delete task").await?;
        Ok(())
    }
}

async fn ensure_success(response: Response, action: &str) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiError>(&body)
        .ok()
        .and_then(|err| err.error.or(err.message))
        .unwrap_or(body);

    warn!(action, status = %status, detail = %detail, "server rejected request");
    Err(StatusError {
        action: action.to_string(),
        status: status.as_u16(),
        detail,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::{StatusError, csrf_from_cookie, is_rejection};

    #[test]
    fn csrf_token_is_read_from_cookie_header() {
        assert_eq!(
            csrf_from_cookie("sessionid=abc; csrftoken=tok123; theme=dark"),
            Some("tok123".to_string())
        );
        assert_eq!(csrf_from_cookie("sessionid=abc"), None);
        assert_eq!(csrf_from_cookie("csrftoken="), None);
    }

    #[test]
    fn client_errors_are_rejections_except_timeouts() {
        let status = |status: u16| StatusError {
            action: "update task".to_string(),
            status,
            detail: String::new(),
        };
        assert!(status(400).is_rejection());
        assert!(status(404).is_rejection());
        assert!(!status(408).is_rejection());
        assert!(!status(429).is_rejection());
        assert!(!status(500).is_rejection());

        let wrapped = anyhow::Error::new(status(404)).context("replaying task 3");
        assert!(is_rejection(&wrapped));
        assert!(!is_rejection(&anyhow::anyhow!("connection refused")));
    }
}
