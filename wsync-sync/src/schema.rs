//! Script schema inference hook.
//!
//! Schema inference is language specific and lives outside this crate. It
//! only enriches script metadata on push; it never affects digests or plans.

use serde_json::Value;

use wsync_core::{Artifact, ArtifactMetadata, ScriptLanguage};

pub trait SchemaInferrer: Send + Sync {
    /// JSON schema of the script's entry point, if one can be derived.
    fn infer_schema(&self, content: &str, language: ScriptLanguage) -> Option<Value>;
}

/// Infers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSchema;

impl SchemaInferrer for NoSchema {
    fn infer_schema(&self, _content: &str, _language: ScriptLanguage) -> Option<Value> {
        None
    }
}

/// A copy of `artifact` with its script schema filled in when missing.
pub fn enrich(artifact: &Artifact, inferrer: &dyn SchemaInferrer) -> Artifact {
    let mut enriched = artifact.clone();
    if let ArtifactMetadata::Script {
        language,
        schema: schema @ None,
    } = &mut enriched.metadata
    {
        *schema = inferrer.infer_schema(&artifact.content, *language);
    }
    enriched
}
