//! Content fingerprints for artifacts and artifact trees.
//!
//! Content is normalized before hashing:
//! - line endings become LF for every kind;
//! - data kinds (everything but scripts) are parsed and re-serialized as
//!   canonical JSON with sorted keys, so formatting and key order do not
//!   change the fingerprint;
//! - script text is otherwise hashed as-is, trailing whitespace included.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ContentError;
use crate::types::{Artifact, ArtifactKind, ArtifactPath, Fingerprint, ScriptLanguage};

/// Fingerprint of a single artifact.
pub fn digest(artifact: &Artifact) -> Result<Fingerprint, ContentError> {
    digest_content(
        &artifact.path,
        artifact.kind(),
        artifact.metadata.language(),
        &artifact.content,
    )
}

/// Fingerprint of raw content for a given kind and language.
pub fn digest_content(
    path: &ArtifactPath,
    kind: ArtifactKind,
    language: Option<ScriptLanguage>,
    content: &str,
) -> Result<Fingerprint, ContentError> {
    let normalized = normalize(path, kind, content)?;
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0]);
    if let Some(language) = language {
        hasher.update(language.as_str().as_bytes());
    }
    hasher.update([0]);
    hasher.update(normalized.as_bytes());
    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Normalized text that is fed to the hash.
pub fn normalize(
    path: &ArtifactPath,
    kind: ArtifactKind,
    content: &str,
) -> Result<String, ContentError> {
    let lf = content.replace("\r\n", "\n");
    if !kind.is_format_insensitive() {
        return Ok(lf);
    }
    let value = parse_data(path, &lf)?;
    Ok(canonical_json(&value))
}

/// Parse a data artifact as JSON (`.json`) or YAML (anything else).
pub fn parse_data(path: &ArtifactPath, content: &str) -> Result<Value, ContentError> {
    if path.as_str().ends_with(".json") {
        serde_json::from_str(content).map_err(|e| ContentError::Malformed {
            path: path.0.clone(),
            format: "JSON",
            message: e.to_string(),
        })
    } else {
        if content.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_yaml::from_str(content).map_err(|e| ContentError::Malformed {
            path: path.0.clone(),
            format: "YAML",
            message: e.to_string(),
        })
    }
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Fingerprint of a set of `(path, digest)` pairs, independent of input order.
pub fn digest_tree<'a, I>(entries: I) -> Fingerprint
where
    I: IntoIterator<Item = (&'a ArtifactPath, &'a Fingerprint)>,
{
    let mut sorted: Vec<(&ArtifactPath, &Fingerprint)> = entries.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted.dedup_by(|a, b| a.0 == b.0);

    let mut hasher = Sha256::new();
    for (path, digest) in sorted {
        hasher.update(path.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(digest.0.as_bytes());
        hasher.update(b"\n");
    }
    Fingerprint(hex::encode(hasher.finalize()))
}

/// [`digest_tree`] restricted to paths under `prefix`.
pub fn digest_prefix<'a, I>(entries: I, prefix: &str) -> Fingerprint
where
    I: IntoIterator<Item = (&'a ArtifactPath, &'a Fingerprint)>,
{
    digest_tree(entries.into_iter().filter(|(path, _)| path.is_under(prefix)))
}
