//! Error types and the user-facing notice mapping.
//!
//! Every subsystem has its own error enum. Remote-call failures carry a
//! [`ServiceErrorKind`] so the retry layer can tell transient failures from
//! permanent ones, and so the orchestration boundary can turn any
//! [`StudioError`] into one of a small, fixed set of [`Notice`]s.

use thiserror::Error;

// ── Synthesis service ──────────────────────────────────────────────

/// Classification of a failed call to the synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// HTTP 429: the service asked us to slow down.
    RateLimited,
    /// 5xx responses and transport failures (timeouts, refused connections).
    Server,
    /// Malformed request or unsupported content.
    Client,
    /// The prompt or the output was rejected by a content-safety filter.
    ContentSafety,
    /// The service answered successfully but returned no text.
    EmptyResponse,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ServiceErrorKind::RateLimited => "rate limited",
            ServiceErrorKind::Server => "server error",
            ServiceErrorKind::Client => "client error",
            ServiceErrorKind::ContentSafety => "content safety rejection",
            ServiceErrorKind::EmptyResponse => "empty response",
        };
        f.write_str(label)
    }
}

/// A failed call to the synthesis service.
#[derive(Debug, Clone, Error)]
#[error("synthesis service {kind}{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Build an error from a non-success HTTP status and its response body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        let kind = match status {
            429 => ServiceErrorKind::RateLimited,
            500..=599 => ServiceErrorKind::Server,
            400 | 403 if mentions_safety(&message) => ServiceErrorKind::ContentSafety,
            _ => ServiceErrorKind::Client,
        };
        Self {
            kind,
            status: Some(status),
            message,
        }
    }

    /// Whether the failure is worth retrying: rate limits and server-side errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ServiceErrorKind::RateLimited | ServiceErrorKind::Server
        )
    }
}

fn mentions_safety(body: &str) -> bool {
    let lower = body.to_lowercase();
    ["safety", "moderation", "flagged", "content_filter", "blocked"]
        .iter()
        .any(|p| lower.contains(p))
}

// ── Persistence ────────────────────────────────────────────────────

/// Failure writing to or reading from a durable key-value slot.
#[derive(Debug, Error)]
pub enum SlotError {
    #[error("storage quota exceeded: {needed} bytes needed, {quota} available")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure persisting the artifact history.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Even a single history entry does not fit in the slot.
    #[error("history could not be stored even after evicting down to one entry: {0}")]
    CapacityExhausted(SlotError),

    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage slot: {0}")]
    Slot(SlotError),
}

// ── Import ─────────────────────────────────────────────────────────

/// Rejection of an imported artifact snapshot.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("not a valid JSON document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("not an artifact snapshot:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

// ── Overlay ────────────────────────────────────────────────────────

/// Misuse of the edit-mode context menu flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverlayError {
    #[error("no context menu is open")]
    NoMenu,

    #[error("no edit action has been chosen")]
    NoPendingEdit,

    #[error("a value is required for this edit")]
    EmptyValue,

    #[error("removal was not confirmed")]
    NotConfirmed,
}

// ── Session boundary ───────────────────────────────────────────────

/// Any failure surfaced by a [`Studio`](crate::studio::Studio) operation.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("import rejected: {0}")]
    Import(#[from] ImportError),

    #[error("export failed: {0}")]
    Export(#[source] serde_json::Error),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error("a generation or refinement request is already in flight")]
    Busy,

    #[error("no artifact is active")]
    NoActiveArtifact,

    #[error("no artifact with id {0}")]
    UnknownArtifact(String),

    #[error("the active artifact changed while the request was in flight")]
    ActiveChanged,
}

/// Category of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeCategory {
    RateLimited,
    ServiceUnavailable,
    InvalidRequest,
    ContentBlocked,
    Storage,
    Import,
    Busy,
    Generic,
}

/// A human-readable message for the person driving the session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Notice {
    pub category: NoticeCategory,
    pub message: String,
}

impl Notice {
    pub fn new(category: NoticeCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

impl StudioError {
    /// Map the error onto the fixed set of user-facing messages.
    pub fn notice(&self) -> Notice {
        match self {
            StudioError::Service(e) => match e.kind {
                ServiceErrorKind::RateLimited => Notice::new(
                    NoticeCategory::RateLimited,
                    "The synthesis service is receiving too many requests. Wait a moment and try again.",
                ),
                ServiceErrorKind::Server => Notice::new(
                    NoticeCategory::ServiceUnavailable,
                    "The synthesis service is temporarily unavailable. Try again shortly.",
                ),
                ServiceErrorKind::Client => Notice::new(
                    NoticeCategory::InvalidRequest,
                    "The request could not be processed. Check the input and try again.",
                ),
                ServiceErrorKind::ContentSafety => Notice::new(
                    NoticeCategory::ContentBlocked,
                    "The request was blocked by content safety filters. Try rephrasing it.",
                ),
                ServiceErrorKind::EmptyResponse => {
                    Notice::new(NoticeCategory::Generic, GENERIC_MESSAGE)
                }
            },
            StudioError::Store(_) => Notice::new(
                NoticeCategory::Storage,
                "Storage is full: this artifact is too large to be saved in history.",
            ),
            StudioError::Import(e) => Notice::new(
                NoticeCategory::Import,
                format!("Could not import the file. {e}"),
            ),
            StudioError::Busy => Notice::new(
                NoticeCategory::Busy,
                "Please wait for the current request to finish.",
            ),
            _ => Notice::new(NoticeCategory::Generic, GENERIC_MESSAGE),
        }
    }
}
