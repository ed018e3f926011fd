//! Artifact export and import.
//!
//! Two export formats: a self-describing JSON snapshot (id, name, body,
//! source image, timestamp) and the bare runnable document. Only snapshots
//! can be imported; they are validated against a JSON Schema before being
//! turned back into an [`Artifact`].

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ImportError;
use crate::json_schema_for;
use crate::store::{Artifact, generate_artifact_id};
use crate::synthesis::ImagePayload;

const SLUG_MAX_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full JSON snapshot, importable.
    Snapshot,
    /// The markup document only.
    Document,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" | "json" => Ok(ExportFormat::Snapshot),
            "document" | "html" => Ok(ExportFormat::Document),
            other => Err(format!("unknown export format '{other}' (snapshot, document)")),
        }
    }
}

/// Serialize `artifact` in `format`.
pub fn export(artifact: &Artifact, format: ExportFormat) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Snapshot => export_snapshot(artifact),
        ExportFormat::Document => Ok(export_document(artifact)),
    }
}

pub fn export_snapshot(artifact: &Artifact) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(artifact)
}

pub fn export_document(artifact: &Artifact) -> String {
    artifact.body.clone()
}

/// File name for an export: the slugified artifact name plus `.json` or `.html`.
pub fn suggested_file_name(artifact: &Artifact, format: ExportFormat) -> String {
    let ext = match format {
        ExportFormat::Snapshot => "json",
        ExportFormat::Document => "html",
    };
    format!("{}.{ext}", slugify(&artifact.name))
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.chars().count() >= SLUG_MAX_CHARS {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "artifact".to_string()
    } else {
        slug.to_string()
    }
}

/// The shape accepted on import. Only `name` and `body` are required.
#[derive(Deserialize, JsonSchema, Debug)]
#[serde(rename_all = "camelCase")]
struct ArtifactImport {
    #[serde(default)]
    id: Option<String>,
    name: String,
    body: String,
    #[serde(default)]
    source_image: Option<ImagePayload>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Parse and validate a previously exported snapshot.
///
/// The identifier is kept when present and generated otherwise. A missing
/// or unparseable timestamp becomes the import time.
pub fn import_snapshot(text: &str) -> Result<Artifact, ImportError> {
    let value: serde_json::Value = serde_json::from_str(text)?;

    let schema = json_schema_for::<ArtifactImport>();
    if let Ok(validator) = jsonschema::validator_for(&schema) {
        let errors: Vec<String> = validator
            .iter_errors(&value)
            .map(|e| format!("  - {}: {e}", e.instance_path()))
            .collect();
        if !errors.is_empty() {
            debug!("Import rejected with {} schema violation(s)", errors.len());
            return Err(ImportError::Invalid(errors));
        }
    }

    let import: ArtifactImport = serde_json::from_value(value)?;
    let id = import
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_artifact_id);
    let created_at = import
        .created_at
        .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    info!("Imported artifact {id} ({:?})", import.name);
    Ok(Artifact {
        id,
        name: import.name,
        body: import.body,
        source_image: import.source_image,
        created_at,
    })
}
