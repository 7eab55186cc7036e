//! POST client with at-most-one-in-flight semantics per idempotence key.
//!
//! A new request under a busy key aborts the older one, whose callbacks then
//! never run. The [`LEAVING_KEY`] inverts that: once a leaving request is in
//! flight the page is on its way out and later leaving requests are dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::task::AbortHandle;
use url::Url;
use watcher_logging::{watch_debug, watch_trace, watch_warn};

use crate::types::map_reqwest_error;
use crate::{FailureKind, FetchError};

pub const LEAVING_KEY: &str = "leaving";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Form(Vec<(String, String)>),
    /// Already encoded; sent as-is.
    Raw(String),
}

impl Payload {
    pub fn empty() -> Self {
        Payload::Form(Vec::new())
    }

    pub fn field(name: &str, value: &str) -> Self {
        Payload::Form(vec![(name.to_string(), value.to_string())])
    }

    pub fn encode(&self) -> String {
        match self {
            Payload::Raw(raw) => raw.clone(),
            Payload::Form(pairs) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub key: String,
    pub path: String,
    pub payload: Payload,
}

impl Request {
    pub fn new(key: impl Into<String>, path: impl Into<String>, payload: Payload) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            payload,
        }
    }

    pub fn is_leaving(&self) -> bool {
        self.key == LEAVING_KEY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Issued,
    /// Issued after aborting an older request under the same key.
    Replaced,
    /// A leaving request was already in flight; nothing was sent.
    Dropped,
}

/// Page-level reactions for outcomes no callback claims.
pub trait RequestHooks: Send + Sync {
    fn redirect_to_login(&self);
    fn prompt_reload(&self, failure: &FetchError);
}

pub type OnSuccess = Box<dyn FnOnce(String) + Send>;
pub type OnFailure = Box<dyn FnOnce(FetchError) + Send>;

struct Pending {
    id: u64,
    abort: AbortHandle,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    hooks: Arc<dyn RequestHooks>,
    pending: Mutex<HashMap<String, Pending>>,
    next_id: AtomicU64,
}

impl ClientInner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the entry for `key` if it still belongs to request `id`.
    fn settle(&self, key: &str, id: u64) -> bool {
        let mut pending = self.lock_pending();
        match pending.get(key) {
            Some(entry) if entry.id == id => {
                pending.remove(key);
                true
            }
            _ => false,
        }
    }

    async fn execute(&self, request: &Request) -> Result<String, FetchError> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;

        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
            .header("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"))
            .body(request.payload.encode())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        match status {
            StatusCode::OK => Ok(body),
            StatusCode::FORBIDDEN => Err(FetchError::new(FailureKind::Unauthorized, body)),
            other => Err(FetchError::new(FailureKind::HttpStatus(other.as_u16()), body)),
        }
    }
}

/// Cheap to clone; clones share the pending map.
#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<ClientInner>,
}

impl RequestClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        timeout: Duration,
        hooks: Arc<dyn RequestHooks>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout,
                hooks,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Issue `request` on the current tokio runtime.
    ///
    /// A 403 always goes to [`RequestHooks::redirect_to_login`]; other
    /// failures go to `on_failure` or, without one, to
    /// [`RequestHooks::prompt_reload`].
    pub fn send(
        &self,
        request: Request,
        on_success: OnSuccess,
        on_failure: Option<OnFailure>,
    ) -> SendOutcome {
        let mut pending = self.inner.lock_pending();
        let mut outcome = SendOutcome::Issued;
        if let Some(existing) = pending.get(&request.key) {
            if request.is_leaving() {
                watch_debug!("leaving request to {} dropped; page already leaving", request.path);
                return SendOutcome::Dropped;
            }
            watch_trace!("superseding pending request under key {}", request.key);
            existing.abort.abort();
            outcome = SendOutcome::Replaced;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let key = request.key.clone();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.execute(&request).await;
            if !inner.settle(&request.key, id) {
                return;
            }
            match result {
                Ok(body) => on_success(body),
                Err(failure) if failure.kind == FailureKind::Unauthorized => {
                    watch_warn!("{} answered 403; session expired", request.path);
                    inner.hooks.redirect_to_login();
                }
                Err(failure) => match on_failure {
                    Some(on_failure) => on_failure(failure),
                    None => {
                        watch_warn!("{} failed: {failure}", request.path);
                        inner.hooks.prompt_reload(&failure);
                    }
                },
            }
        });
        pending.insert(
            key,
            Pending {
                id,
                abort: task.abort_handle(),
            },
        );
        outcome
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.lock_pending().contains_key(key)
    }
}
