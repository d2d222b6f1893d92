//! The HTTP action dispatcher.
//!
//! # Design
//! `Dispatcher` carries no mutable state between calls. Each verb comes in three
//! layers:
//! - `build_*` produces an `HttpRequest` without touching the network;
//! - `try_*` executes it through the transport and applies the status
//!   policy, returning `Result<HttpResponse, DispatchError>`;
//! - the plain verb (`get`, `post`, `put`, `delete`) routes that result to
//!   exactly one of the caller's two handlers.
//!
//! Only PUT has policies beyond "success set or failure": a 409 triggers a
//! bounded re-fetch/reapply/resubmit loop and a 412 triggers one three-way
//! merge followed by a single resubmit. Every intermediate response stays
//! internal; the handlers see the final outcome only.

use serde::Serialize;
use uuid::Uuid;

use crate::backoff::calculate_backoff;
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::merge;
use crate::transport::Transport;
use crate::types::{parse_representation, Edit, Representation};

const CONFLICT: u16 = 409;
const PRECONDITION_FAILED: u16 = 412;

/// Conflict-aware HTTP dispatcher over a pluggable `Transport`.
///
/// Holds only the transport, its `DispatcherConfig` and an optional base url.
/// Every call resolves to exactly one handler invocation, after any internal
/// retry or merge rounds; intermediate responses never reach the caller.
#[derive(Debug, Clone)]
pub struct Dispatcher<T> {
    transport: T,
    config: DispatcherConfig,
    base_url: Option<String>,
}

impl<T> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: DispatcherConfig::default(),
            base_url: None,
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Relative urls passed to the verbs are joined onto `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Absolute urls pass through; anything else is joined onto the base url.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match &self.base_url {
            Some(base) => format!("{base}/{}", url.trim_start_matches('/')),
            None => url.to_string(),
        }
    }

    pub fn build_get(&self, url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: self.resolve(url),
            headers: vec![("accept".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn build_post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<HttpRequest, DispatchError> {
        let body = serde_json::to_string(body)?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: self.resolve(url),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }

    /// `etag`, when present, becomes the `If-Match` precondition.
    pub fn build_put(
        &self,
        url: &str,
        body: &Representation,
        etag: Option<&str>,
    ) -> Result<HttpRequest, DispatchError> {
        let body = serde_json::to_string(body)?;
        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
        if let Some(etag) = etag {
            headers.push(("if-match".to_string(), etag.to_string()));
        }
        Ok(HttpRequest {
            method: HttpMethod::Put,
            path: self.resolve(url),
            headers,
            body: Some(body),
        })
    }

    pub fn build_delete(&self, url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            path: self.resolve(url),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Map a final response onto the success set.
    fn check_status(&self, response: HttpResponse) -> Result<HttpResponse, DispatchError> {
        if self.config.is_success(response.status) {
            Ok(response)
        } else {
            Err(DispatchError::Rejected(response))
        }
    }
}

#[cfg(feature = "reqwest")]
impl Dispatcher<crate::transport::ReqwestTransport> {
    /// Dispatcher over a fresh reqwest client honoring `config.timeout_ms`.
    pub fn from_config(config: DispatcherConfig) -> Self {
        let transport = crate::transport::ReqwestTransport::new().with_timeout(config.timeout());
        Self::new(transport).with_config(config)
    }
}

impl<T: Transport> Dispatcher<T> {
    pub async fn try_get(&self, url: &str) -> Result<HttpResponse, DispatchError> {
        let request_id = Uuid::new_v4();
        let response = self.send(self.build_get(url), request_id, 1).await?;
        self.check_status(response)
    }

    pub async fn try_post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<HttpResponse, DispatchError> {
        let request_id = Uuid::new_v4();
        let request = self.build_post(url, body)?;
        let response = self.send(request, request_id, 1).await?;
        self.check_status(response)
    }

    pub async fn try_delete(&self, url: &str) -> Result<HttpResponse, DispatchError> {
        let request_id = Uuid::new_v4();
        let response = self.send(self.build_delete(url), request_id, 1).await?;
        self.check_status(response)
    }

    /// PUT `edit.proposed()`, retrying on 409 and merging once on 412.
    pub async fn try_put(&self, url: &str, edit: &Edit) -> Result<HttpResponse, DispatchError> {
        let request_id = Uuid::new_v4();
        let mut body = edit.proposed();
        let mut etag = edit.etag.clone();
        // Representation the in-flight body was built on.
        let mut ancestor = edit.base.clone();
        let mut conflicts = 0u32;
        let mut merged = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let request = self.build_put(url, &body, etag.as_deref())?;
            let response = self.send(request, request_id, attempt).await?;

            if self.config.is_success(response.status) {
                return Ok(response);
            }

            match response.status {
                CONFLICT if conflicts < self.config.conflict_retries() => {
                    conflicts += 1;
                    let delay = calculate_backoff(conflicts, self.config.backoff_base_ms, self.config.backoff_max_ms);
                    tracing::info!(
                        request_id = %request_id,
                        retry = conflicts,
                        delay = ?delay,
                        "Conflict on PUT, re-fetching and retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let (server, server_etag) = self.refetch(url, request_id, attempt).await?;
                    body = merge::reapply(&server, &edit.changes);
                    ancestor = server;
                    etag = server_etag;
                }
                PRECONDITION_FAILED if !merged => {
                    merged = true;
                    tracing::info!(request_id = %request_id, "Precondition failed on PUT, merging with server state");
                    let (server, server_etag) = self.refetch(url, request_id, attempt).await?;
                    body = merge::merge(&ancestor, &server, &edit.changes, &edit.authoritative);
                    etag = server_etag;
                }
                status => {
                    if status == CONFLICT || status == PRECONDITION_FAILED {
                        tracing::warn!(request_id = %request_id, status, attempt, "PUT gave up after exhausting retries");
                    }
                    return Err(DispatchError::Rejected(response));
                }
            }
        }
    }

    pub async fn get<S, F>(&self, url: &str, on_success: S, on_failure: F)
    where
        S: FnOnce(&HttpResponse),
        F: FnOnce(&DispatchError),
    {
        deliver(self.try_get(url).await, on_success, on_failure);
    }

    pub async fn post<B, S, F>(&self, url: &str, body: &B, on_success: S, on_failure: F)
    where
        B: Serialize + ?Sized,
        S: FnOnce(&HttpResponse),
        F: FnOnce(&DispatchError),
    {
        deliver(self.try_post(url, body).await, on_success, on_failure);
    }

    pub async fn put<S, F>(&self, url: &str, edit: &Edit, on_success: S, on_failure: F)
    where
        S: FnOnce(&HttpResponse),
        F: FnOnce(&DispatchError),
    {
        deliver(self.try_put(url, edit).await, on_success, on_failure);
    }

    pub async fn delete<S, F>(&self, url: &str, on_success: S, on_failure: F)
    where
        S: FnOnce(&HttpResponse),
        F: FnOnce(&DispatchError),
    {
        deliver(self.try_delete(url).await, on_success, on_failure);
    }

    async fn send(&self, request: HttpRequest, request_id: Uuid, attempt: u32) -> Result<HttpResponse, DispatchError> {
        let method = request.method;
        let url = request.path.clone();
        tracing::debug!(request_id = %request_id, %method, url = %url, attempt, "Sending request");

        match self.transport.execute(request).await {
            Ok(response) => {
                tracing::debug!(request_id = %request_id, %method, url = %url, status = response.status, "Response received");
                Ok(response)
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, %method, url = %url, error = %e, "Transport error");
                Err(e.into())
            }
        }
    }

    /// GET the current representation and its ETag.
    async fn refetch(
        &self,
        url: &str,
        request_id: Uuid,
        attempt: u32,
    ) -> Result<(Representation, Option<String>), DispatchError> {
        let response = self.send(self.build_get(url), request_id, attempt).await?;
        if !self.config.is_success(response.status) {
            tracing::warn!(request_id = %request_id, status = response.status, "Re-fetch failed");
            return Err(DispatchError::Rejected(response));
        }
        let server = parse_representation(&response)?;
        Ok((server, response.etag().map(str::to_string)))
    }
}

fn deliver<S, F>(result: Result<HttpResponse, DispatchError>, on_success: S, on_failure: F)
where
    S: FnOnce(&HttpResponse),
    F: FnOnce(&DispatchError),
{
    match result {
        Ok(response) => on_success(&response),
        Err(error) => on_failure(&error),
    }
}
