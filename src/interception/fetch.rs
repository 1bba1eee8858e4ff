// src/interception/fetch.rs
//! Call-and-await hook
//!
//! [`InterceptedFetch`] decorates any [`FetchHook`] and is itself a
//! `FetchHook`, so callers swap it in where the original was used. The begin
//! record is persisted and published when `fetch` is called, before the inner
//! future is first polled. The inner result is handed back untouched.

use crate::interception::body::{normalize_headers, Body, Headers};
use crate::interception::context::{CaptureContext, ResponseParts};
use crate::interception::record::{FailureInfo, FailureKind, NetworkKind};
use std::fmt::Display;
use std::future::Future;
use tracing::debug;

/// Outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HookRequest {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Body,
}

impl HookRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Body>) -> Self {
        Self::new("POST", url).with_body(body)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }
}

/// Response produced by a hook
#[derive(Debug, Clone, PartialEq)]
pub struct HookResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Body,

    /// Cache status reported by the environment, if it knows
    pub cache_status: Option<bool>,
}

impl HookResponse {
    pub fn new(status: u16, body: impl Into<Body>) -> Self {
        Self {
            status,
            status_text: default_status_text(status).to_string(),
            headers: Headers::new(),
            body: body.into(),
            cache_status: None,
        }
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        self.headers.extend(normalize_headers(headers));
        self
    }

    pub fn with_cache_status(mut self, cached: bool) -> Self {
        self.cache_status = Some(cached);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn default_status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Asynchronous network entry point
pub trait FetchHook: Send + Sync {
    type Error: Display + Send;

    fn fetch(
        &self,
        request: HookRequest,
    ) -> impl Future<Output = Result<HookResponse, Self::Error>> + Send;

    /// How a failure should be labelled in the captured record
    fn failure_kind(_error: &Self::Error) -> FailureKind {
        FailureKind::Error
    }
}

/// Closure-backed [`FetchHook`]
pub struct FetchFn<F>(F);

/// Wrap a closure returning a future as a [`FetchHook`]
pub fn fetch_fn<F, Fut, E>(f: F) -> FetchFn<F>
where
    F: Fn(HookRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HookResponse, E>> + Send,
    E: Display + Send,
{
    FetchFn(f)
}

impl<F, Fut, E> FetchHook for FetchFn<F>
where
    F: Fn(HookRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HookResponse, E>> + Send,
    E: Display + Send,
{
    type Error = E;

    fn fetch(&self, request: HookRequest) -> impl Future<Output = Result<HookResponse, E>> + Send {
        (self.0)(request)
    }
}

/// Recording decorator around a [`FetchHook`]
pub struct InterceptedFetch<H> {
    inner: H,
    ctx: CaptureContext,
}

impl<H: FetchHook> InterceptedFetch<H> {
    pub fn new(inner: H, ctx: CaptureContext) -> Self {
        Self { inner, ctx }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Release the original hook
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: FetchHook> FetchHook for InterceptedFetch<H> {
    type Error = H::Error;

    fn fetch(
        &self,
        request: HookRequest,
    ) -> impl Future<Output = Result<HookResponse, H::Error>> + Send {
        let pending = self.ctx.begin(
            NetworkKind::Fetch,
            &request.method,
            &request.url,
            request.headers.clone(),
            &request.body,
        );
        let call = self.inner.fetch(request);
        let ctx = &self.ctx;

        async move {
            let result = call.await;

            if let Some(pending) = pending {
                match &result {
                    Ok(response) => {
                        ctx.resolve(
                            &pending,
                            ResponseParts {
                                status: response.status,
                                status_text: &response.status_text,
                                headers: &response.headers,
                                body: &response.body,
                                cache_status: response.cache_status,
                            },
                        );
                    }
                    Err(err) => {
                        debug!(id = %pending.correlation_id, error = %err, "Fetch failed");
                        ctx.fail(&pending, FailureInfo::new(H::failure_kind(err), err.to_string()));
                    }
                }
            }

            result
        }
    }

    fn failure_kind(error: &Self::Error) -> FailureKind {
        H::failure_kind(error)
    }
}
