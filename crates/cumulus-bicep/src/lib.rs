pub mod engine;
mod normalize;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cumulus_core::{build_template, ArmTemplate, ExtractionError, TopologyGraph};

pub use engine::{BicepCli, Converter};
pub use normalize::normalize;

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("bicep executable not found: {0}")]
    NotFound(String),

    #[error("could not run bicep: {0}")]
    Spawn(String),

    #[error("bicep decompile failed (exit code {}): {stderr}", exit_code(.code))]
    Failed { code: Option<i32>, stderr: String },

    #[error("decompilation produced no output")]
    EmptyOutput,

    #[error("cannot serialize template: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Decompile(#[from] DecompileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Bicep,
}

/// Rendered export plus the template it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub content: String,
    pub template: ArmTemplate,
}

/// Convert a built template to Bicep. Returns non-empty text or an error,
/// never both; failures are logged and surfaced, never retried.
pub async fn decompile(template: &ArmTemplate, converter: &dyn Converter) -> Result<String, DecompileError> {
    let json = template.to_json()?;
    let result = converter
        .decompile(&json)
        .await
        .map(|raw| normalize(&raw))
        .and_then(|text| {
            if text.is_empty() {
                Err(DecompileError::EmptyOutput)
            } else {
                Ok(text)
            }
        });
    match &result {
        Ok(text) => tracing::info!(bytes = text.len(), "template decompiled to bicep"),
        Err(e) => tracing::error!("decompile failed: {}", e),
    }
    result
}

/// Render an already built template.
pub async fn export_template(
    template: ArmTemplate,
    format: ExportFormat,
    converter: &dyn Converter,
) -> Result<ExportArtifact, DecompileError> {
    let content = match format {
        ExportFormat::Json => template.to_json()?,
        ExportFormat::Bicep => decompile(&template, converter).await?,
    };
    Ok(ExportArtifact {
        format,
        content,
        template,
    })
}

/// Build and render a graph. `Ok(None)` when the graph has nothing to export.
pub async fn export(
    graph: &TopologyGraph,
    format: ExportFormat,
    converter: &dyn Converter,
) -> Result<Option<ExportArtifact>, ExportError> {
    let Some(template) = build_template(graph)? else {
        tracing::info!("nothing to export");
        return Ok(None);
    };
    Ok(Some(export_template(template, format, converter).await?))
}
