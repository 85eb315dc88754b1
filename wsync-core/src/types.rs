//! Domain types for workspace synchronization.
//!
//! Artifact paths are workspace-relative `/`-separated strings, never
//! `PathBuf`: they name remote objects as much as local files.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest;
use crate::error::ContentError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Hierarchical, case-sensitive artifact identifier (`f/billing/charge.ts`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactPath(pub String);

impl ArtifactPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name component (after the last `/`).
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The path with every extension stripped from the file name.
    ///
    /// `f/a/b.flow.yaml` → `f/a/b`. Dependency hints name artifacts this way.
    pub fn stem_path(&self) -> &str {
        let name_start = self.0.rfind('/').map(|i| i + 1).unwrap_or(0);
        match self.0[name_start..].find('.') {
            Some(0) | None => &self.0,
            Some(dot) => &self.0[..name_start + dot],
        }
    }

    /// Whether this path equals `prefix` or lives under it.
    ///
    /// An empty prefix matches everything; a trailing `/` is optional.
    pub fn is_under(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        self.0 == prefix
            || (self.0.starts_with(prefix) && self.0.as_bytes().get(prefix.len()) == Some(&b'/'))
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ArtifactPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ArtifactPath {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Hex SHA-256 content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, for human-facing output.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque version token issued by the remote for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteVersion(pub String);

impl fmt::Display for RemoteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RemoteVersion {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RemoteVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Artifact category. Immutable for a given path once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Folder,
    ResourceType,
    Resource,
    Script,
    Flow,
    App,
    Schedule,
    Variable,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Folder => "folder",
            ArtifactKind::ResourceType => "resource_type",
            ArtifactKind::Resource => "resource",
            ArtifactKind::Script => "script",
            ArtifactKind::Flow => "flow",
            ArtifactKind::App => "app",
            ArtifactKind::Schedule => "schedule",
            ArtifactKind::Variable => "variable",
        }
    }

    /// Creation priority: folders and types first, consumers later.
    pub fn rank(self) -> u8 {
        match self {
            ArtifactKind::Folder => 0,
            ArtifactKind::ResourceType => 1,
            ArtifactKind::Resource => 2,
            ArtifactKind::Script => 3,
            ArtifactKind::Flow => 4,
            ArtifactKind::App => 5,
            ArtifactKind::Schedule => 6,
            ArtifactKind::Variable => 7,
        }
    }

    /// Data kinds are compared on parsed structure, scripts on text.
    pub fn is_format_insensitive(self) -> bool {
        !matches!(self, ArtifactKind::Script)
    }

    /// Infer the kind from a workspace-relative path.
    ///
    /// Returns `None` for files that are not artifacts.
    pub fn infer(path: &ArtifactPath) -> Option<Self> {
        let file_name = path.file_name();
        let (stem, ext) = file_name.rsplit_once('.')?;

        if matches!(ext, "yaml" | "yml" | "json") {
            if stem == "folder.meta" {
                return Some(ArtifactKind::Folder);
            }
            if let Some((_, sub)) = stem.rsplit_once('.') {
                let by_suffix = match sub {
                    "flow" => Some(ArtifactKind::Flow),
                    "app" => Some(ArtifactKind::App),
                    "resource" => Some(ArtifactKind::Resource),
                    "resource-type" => Some(ArtifactKind::ResourceType),
                    "variable" => Some(ArtifactKind::Variable),
                    "schedule" => Some(ArtifactKind::Schedule),
                    _ => None,
                };
                if by_suffix.is_some() {
                    return by_suffix;
                }
            }
            let top = path.as_str().split_once('/').map(|(top, _)| top);
            return Some(match top {
                Some("flows") => ArtifactKind::Flow,
                Some("apps") => ArtifactKind::App,
                Some("variables") => ArtifactKind::Variable,
                Some("schedules") => ArtifactKind::Schedule,
                _ => ArtifactKind::Resource,
            });
        }

        ScriptLanguage::from_extension(ext).map(|_| ArtifactKind::Script)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Script language, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptLanguage {
    TypeScript,
    JavaScript,
    Python,
    Go,
    Bash,
    Sql,
    GraphQl,
    PowerShell,
    Php,
    Rust,
    CSharp,
    Nu,
    Java,
}

impl ScriptLanguage {
    pub fn from_extension(ext: &str) -> Option<Self> {
        Some(match ext {
            "ts" => ScriptLanguage::TypeScript,
            "js" => ScriptLanguage::JavaScript,
            "py" => ScriptLanguage::Python,
            "go" => ScriptLanguage::Go,
            "sh" => ScriptLanguage::Bash,
            "sql" => ScriptLanguage::Sql,
            "gql" => ScriptLanguage::GraphQl,
            "ps1" => ScriptLanguage::PowerShell,
            "php" => ScriptLanguage::Php,
            "rs" => ScriptLanguage::Rust,
            "cs" => ScriptLanguage::CSharp,
            "nu" => ScriptLanguage::Nu,
            "java" => ScriptLanguage::Java,
            _ => return None,
        })
    }

    pub fn from_path(path: &ArtifactPath) -> Option<Self> {
        let (_, ext) = path.file_name().rsplit_once('.')?;
        Self::from_extension(ext)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptLanguage::TypeScript => "typescript",
            ScriptLanguage::JavaScript => "javascript",
            ScriptLanguage::Python => "python",
            ScriptLanguage::Go => "go",
            ScriptLanguage::Bash => "bash",
            ScriptLanguage::Sql => "sql",
            ScriptLanguage::GraphQl => "graphql",
            ScriptLanguage::PowerShell => "powershell",
            ScriptLanguage::Php => "php",
            ScriptLanguage::Rust => "rust",
            ScriptLanguage::CSharp => "csharp",
            ScriptLanguage::Nu => "nu",
            ScriptLanguage::Java => "java",
        }
    }
}

impl fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// Kind-specific metadata, tagged by `kind`.
///
/// Extracted from content at the boundary; never trusted from the wire
/// without re-validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactMetadata {
    Folder,
    ResourceType,
    Resource {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_type: Option<String>,
    },
    Script {
        language: ScriptLanguage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Value>,
    },
    Flow {
        #[serde(default)]
        dependencies: Vec<ArtifactPath>,
    },
    App {
        #[serde(default)]
        dependencies: Vec<ArtifactPath>,
    },
    Schedule {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script_path: Option<ArtifactPath>,
    },
    Variable {
        #[serde(default)]
        is_secret: bool,
    },
}

impl ArtifactMetadata {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactMetadata::Folder => ArtifactKind::Folder,
            ArtifactMetadata::ResourceType => ArtifactKind::ResourceType,
            ArtifactMetadata::Resource { .. } => ArtifactKind::Resource,
            ArtifactMetadata::Script { .. } => ArtifactKind::Script,
            ArtifactMetadata::Flow { .. } => ArtifactKind::Flow,
            ArtifactMetadata::App { .. } => ArtifactKind::App,
            ArtifactMetadata::Schedule { .. } => ArtifactKind::Schedule,
            ArtifactMetadata::Variable { .. } => ArtifactKind::Variable,
        }
    }

    pub fn language(&self) -> Option<ScriptLanguage> {
        match self {
            ArtifactMetadata::Script { language, .. } => Some(*language),
            _ => None,
        }
    }

    /// Paths this artifact references, in stem form (see [`ArtifactPath::stem_path`]).
    pub fn dependencies(&self) -> Vec<ArtifactPath> {
        match self {
            ArtifactMetadata::Flow { dependencies } | ArtifactMetadata::App { dependencies } => {
                dependencies.clone()
            }
            ArtifactMetadata::Schedule {
                script_path: Some(p),
            } => vec![p.clone()],
            _ => Vec::new(),
        }
    }

    /// Parse and validate kind-specific metadata out of `content`.
    pub fn extract(
        path: &ArtifactPath,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<Self, ContentError> {
        if kind == ArtifactKind::Script {
            return Self::script(path);
        }

        let value = digest::parse_data(path, content)?;
        Ok(match kind {
            ArtifactKind::Folder => ArtifactMetadata::Folder,
            ArtifactKind::ResourceType => ArtifactMetadata::ResourceType,
            ArtifactKind::Resource => ArtifactMetadata::Resource {
                resource_type: value
                    .get("resource_type")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            },
            ArtifactKind::Flow => ArtifactMetadata::Flow {
                dependencies: collect_references(&value),
            },
            ArtifactKind::App => ArtifactMetadata::App {
                dependencies: collect_references(&value),
            },
            ArtifactKind::Schedule => ArtifactMetadata::Schedule {
                script_path: value
                    .get("script_path")
                    .and_then(Value::as_str)
                    .map(ArtifactPath::from),
            },
            ArtifactKind::Variable => ArtifactMetadata::Variable {
                is_secret: value
                    .get("is_secret")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            ArtifactKind::Script => return Self::script(path),
        })
    }

    fn script(path: &ArtifactPath) -> Result<Self, ContentError> {
        let language = ScriptLanguage::from_path(path).ok_or_else(|| ContentError::UnknownKind {
            path: path.0.clone(),
        })?;
        Ok(ArtifactMetadata::Script {
            language,
            schema: None,
        })
    }
}

/// Every `path` whose sibling `type` is `script` or `flow`, sorted and deduplicated.
fn collect_references(value: &Value) -> Vec<ArtifactPath> {
    fn walk(value: &Value, out: &mut Vec<ArtifactPath>) {
        match value {
            Value::Object(map) => {
                let is_ref = matches!(
                    map.get("type").and_then(Value::as_str),
                    Some("script" | "flow")
                );
                if is_ref {
                    if let Some(p) = map.get("path").and_then(Value::as_str) {
                        out.push(ArtifactPath::from(p));
                    }
                }
                for child in map.values() {
                    walk(child, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out.sort();
    out.dedup();
    out
}

/// A named, typed unit of workspace content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: ArtifactPath,
    pub content: String,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    /// Build an artifact from text, inferring its kind from `path`.
    pub fn from_content(path: ArtifactPath, content: String) -> Result<Self, ContentError> {
        let kind = ArtifactKind::infer(&path).ok_or_else(|| ContentError::UnknownKind {
            path: path.0.clone(),
        })?;
        let metadata = ArtifactMetadata::extract(&path, kind, &content)?;
        Ok(Self {
            path,
            content,
            metadata,
        })
    }

    /// Like [`Artifact::from_content`], rejecting content that is not UTF-8.
    pub fn from_bytes(path: ArtifactPath, bytes: Vec<u8>) -> Result<Self, ContentError> {
        let content = String::from_utf8(bytes).map_err(|_| ContentError::NotUtf8 {
            path: path.0.clone(),
        })?;
        Self::from_content(path, content)
    }

    pub fn kind(&self) -> ArtifactKind {
        self.metadata.kind()
    }

    pub fn digest(&self) -> Result<Fingerprint, ContentError> {
        digest::digest(self)
    }
}

// ---------------------------------------------------------------------------
// Sync bookkeeping
// ---------------------------------------------------------------------------

/// Last successful sync of a single path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub digest: Fingerprint,
    pub remote_version: RemoteVersion,
}

/// Bearer credential for the remote API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
