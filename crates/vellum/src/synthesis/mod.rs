//! The synthesis seam: the remote generative model and the gateway in front of it.
//!
//! - [`SynthesisService`]: the external collaborator. One structured request
//!   in, raw text out. [`OpenRouterClient`](crate::OpenRouterClient) is the
//!   production implementation.
//! - [`gateway::SynthesisGateway`]: builds generate/refine requests, runs
//!   them through [`retry_call`](crate::api::retry_call), and cleans the output.
//! - [`prompt`]: fixed directives and style presets.
//! - [`cleanup`]: fenced-code-marker stripping.

pub mod cleanup;
pub mod gateway;
pub mod prompt;

pub use cleanup::strip_code_fences;
pub use gateway::{GenerateRequest, SynthesisGateway};
pub use prompt::StylePreset;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Future returned by [`SynthesisService::synthesize`].
pub type SynthesisFuture<'a> = BoxFuture<'a, Result<String, ServiceError>>;

/// A remote generative model.
///
/// Implementations must classify failures through
/// [`ServiceError::kind`](crate::error::ServiceError) so that the gateway can
/// retry transient ones.
pub trait SynthesisService: Send + Sync {
    fn synthesize<'a>(&'a self, request: &'a SynthesisRequest) -> SynthesisFuture<'a>;
}

/// One request to the synthesis service.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// The instructional text.
    pub instruction: String,
    /// Optional inline binary payload (image or document).
    pub image: Option<ImagePayload>,
    /// Optional system directive.
    pub system: Option<String>,
    pub temperature: f32,
}

/// An inline binary payload, stored base64-encoded alongside its MIME type.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub mime_type: String,
    /// Base64 (standard alphabet) encoded bytes.
    pub data: String,
}

impl ImagePayload {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Parse a `data:<mime>;base64,<payload>` URI. Returns `None` for any
    /// other shape, including non-base64 data URIs.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (header, data) = rest.split_once(',')?;
        let mime_type = header.strip_suffix(";base64")?;
        if mime_type.is_empty() || STANDARD.decode(data).is_err() {
            return None;
        }
        Some(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }

    /// Guess a MIME type from a file extension.
    pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            "pdf" => Some("application/pdf"),
            _ => None,
        }
    }
}
