//! Downstream call failures
//!
//! Every failure of a call to the ledger service is normalized into one
//! `DownstreamError` carrying the service, the endpoint, the HTTP status (if
//! a response arrived) and the typed error code from the response body.

use std::fmt;

use serde::Deserialize;

/// Error codes the ledger reports for lock contention. Only these are
/// retried by the orchestrator.
pub const TRANSIENT_ERROR_CODES: &[&str] = &["lock_timeout", "concurrent_modification"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownstreamErrorKind {
    /// 400, 409, 422: the request was understood and refused
    BadRequest,
    /// 404
    NotFound,
    /// 401, 403
    AccessDenied,
    /// 502, 503, 504 or no response at all
    Unavailable,
    /// Anything else
    Generic,
}

impl DownstreamErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 409 | 422 => DownstreamErrorKind::BadRequest,
            404 => DownstreamErrorKind::NotFound,
            401 | 403 => DownstreamErrorKind::AccessDenied,
            502..=504 => DownstreamErrorKind::Unavailable,
            _ => DownstreamErrorKind::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownstreamErrorKind::BadRequest => "bad_request",
            DownstreamErrorKind::NotFound => "not_found",
            DownstreamErrorKind::AccessDenied => "access_denied",
            DownstreamErrorKind::Unavailable => "unavailable",
            DownstreamErrorKind::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct DownstreamError {
    pub kind: DownstreamErrorKind,
    pub service: String,
    pub endpoint: String,
    pub status: Option<u16>,
    /// Typed `error_code` from the response body, when present
    pub code: Option<String>,
    pub body: String,
}

impl fmt::Display for DownstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} failed ({}): {}",
            self.service,
            self.endpoint,
            self.kind.as_str(),
            self.summary()
        )
    }
}

/// Error body shape shared by both services
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: Option<String>,
}

impl DownstreamError {
    /// Build from a non-success HTTP response
    pub fn from_response(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();
        let code = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error_code);
        Self {
            kind: DownstreamErrorKind::from_status(status),
            service: service.into(),
            endpoint: endpoint.into(),
            status: Some(status),
            code,
            body,
        }
    }

    /// The call never produced a response
    pub fn unreachable(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: DownstreamErrorKind::Unavailable,
            service: service.into(),
            endpoint: endpoint.into(),
            status: None,
            code: None,
            body: reason.into(),
        }
    }

    /// Response arrived but could not be decoded
    pub fn malformed(
        service: impl Into<String>,
        endpoint: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind: DownstreamErrorKind::Generic,
            service: service.into(),
            endpoint: endpoint.into(),
            status: None,
            code: None,
            body: reason.into(),
        }
    }

    /// Lock contention in the ledger; the same request may succeed if sent
    /// again. Decided by the typed code, never by message text.
    pub fn is_transient(&self) -> bool {
        self.code
            .as_deref()
            .map(|code| TRANSIENT_ERROR_CODES.contains(&code))
            .unwrap_or(false)
    }

    /// Short reason stored on a failed transaction record
    pub fn summary(&self) -> String {
        match (&self.code, self.status) {
            (Some(code), Some(status)) => format!("{} (HTTP {})", code, status),
            (Some(code), None) => code.clone(),
            (None, Some(status)) => format!("HTTP {}", status),
            (None, None) => self.body.clone(),
        }
    }
}
