//! Request construction and output post-processing around the synthesis service.

use std::sync::Arc;

use tracing::{debug, info};

use super::cleanup::strip_code_fences;
use super::prompt::{
    GENERATION_SYSTEM_PROMPT, REFINEMENT_SYSTEM_PROMPT, StylePreset, generation_instruction,
    refinement_instruction,
};
use super::{ImagePayload, SynthesisRequest, SynthesisService};
use crate::api::retry::{RetryConfig, retry_call};
use crate::config::StudioConfig;
use crate::error::ServiceError;
use crate::store::{UNTITLED, derive_name};

/// Inputs for a generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Free-text prompt. Ignored when an image is attached.
    pub prompt: String,
    pub image: Option<ImagePayload>,
    pub style: StylePreset,
    /// CSS rules the generated `<style>` block must include verbatim.
    pub custom_css: Option<String>,
    /// Uploaded file name, used to name artifacts generated from an image.
    pub source_name: Option<String>,
}

impl GenerateRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn image(image: ImagePayload) -> Self {
        Self {
            image: Some(image),
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style: StylePreset) -> Self {
        self.style = style;
        self
    }

    pub fn with_custom_css(mut self, css: impl Into<String>) -> Self {
        self.custom_css = Some(css.into());
        self
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Display name for the artifact this request produces.
    pub fn artifact_name(&self) -> String {
        match (&self.image, &self.source_name) {
            (Some(_), Some(name)) if !name.trim().is_empty() => name.trim().to_string(),
            (Some(_), _) => UNTITLED.to_string(),
            (None, _) => derive_name(&self.prompt),
        }
    }
}

/// Builds model requests and cleans up model output.
///
/// Both operations run through [`retry_call`] with
/// [`ServiceError::is_transient`] as the retry predicate. Errors surface
/// untouched; mapping them to user-facing messages is the caller's job.
pub struct SynthesisGateway {
    service: Arc<dyn SynthesisService>,
    retry: RetryConfig,
    generate_temperature: f32,
    refine_temperature: f32,
}

impl SynthesisGateway {
    pub fn new(service: Arc<dyn SynthesisService>, config: &StudioConfig) -> Self {
        Self {
            service,
            retry: config.retry.clone(),
            generate_temperature: config.generate_temperature,
            refine_temperature: config.refine_temperature,
        }
    }

    /// Produce a new document body from a prompt and/or an image payload.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<String, ServiceError> {
        let instruction = generation_instruction(
            &request.prompt,
            request.image.is_some(),
            &request.style,
            request.custom_css.as_deref(),
        );
        let req = SynthesisRequest {
            instruction,
            image: request.image.clone(),
            system: Some(GENERATION_SYSTEM_PROMPT.to_string()),
            temperature: self.generate_temperature,
        };
        info!(
            "Generating artifact (image={}, style={})",
            req.image.is_some(),
            request.style.name()
        );
        self.dispatch(&req).await
    }

    /// Produce a modified version of `current_body` satisfying `instruction`.
    pub async fn refine(
        &self,
        current_body: &str,
        instruction: &str,
        image: Option<&ImagePayload>,
    ) -> Result<String, ServiceError> {
        let req = SynthesisRequest {
            instruction: refinement_instruction(current_body, instruction),
            image: image.cloned(),
            system: Some(REFINEMENT_SYSTEM_PROMPT.to_string()),
            temperature: self.refine_temperature,
        };
        info!("Refining artifact: {instruction}");
        self.dispatch(&req).await
    }

    async fn dispatch(&self, req: &SynthesisRequest) -> Result<String, ServiceError> {
        let raw = retry_call(&self.retry, ServiceError::is_transient, || {
            self.service.synthesize(req)
        })
        .await?;
        let body = strip_code_fences(&raw);
        debug!("Synthesized body: {} bytes (raw {} bytes)", body.len(), raw.len());
        Ok(body)
    }
}
