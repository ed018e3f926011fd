//! Convenience re-exports for common `vellum` types.
//!
//! ```ignore
//! use vellum::prelude::*;
//! ```
//!
//! Covers opening a session, generating and refining artifacts, and driving
//! the overlay. Lower-level pieces (the markup parser internals, raw chat
//! request types) stay in their modules.

// ── Session ─────────────────────────────────────────────────────────
pub use crate::config::StudioConfig;
pub use crate::studio::{GenerationTicket, RefinementTicket, Studio};
pub use crate::{OpenRouterClient, json_schema_for};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{
    ImportError, Notice, NoticeCategory, OverlayError, ServiceError, ServiceErrorKind, StoreError,
    StudioError,
};

// ── Synthesis ───────────────────────────────────────────────────────
pub use crate::api::retry::{RetryConfig, retry_call};
pub use crate::synthesis::{
    GenerateRequest, ImagePayload, StylePreset, SynthesisFuture, SynthesisGateway,
    SynthesisRequest, SynthesisService,
};

// ── History ─────────────────────────────────────────────────────────
pub use crate::store::{Artifact, ArtifactStore, FileSlot, KvSlot, MemorySlot};
pub use crate::transfer::ExportFormat;
pub use crate::versions::VersionController;

// ── Overlay ─────────────────────────────────────────────────────────
pub use crate::overlay::{
    ContextMenu, EditAction, EditResponse, ElementPath, InspectedElementReport,
    InteractionOverlay, MarkupDocument, OverlayMode, OverlayOutcome, PointerEvent, PreviewView,
    RenderedDocument,
};
