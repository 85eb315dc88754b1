//! [`RemoteWorkspace`] over the remote's sync REST endpoints.
//!
//! ```text
//! GET  {remote}/api/w/{workspace}/sync/list          -> [RemoteEntry]
//! GET  {remote}/api/w/{workspace}/sync/get/{path}    -> {path, content, metadata?, version}
//! POST {remote}/api/w/{workspace}/sync/put           {path, content, metadata, expected_version?}
//!                                                     -> {version}
//! POST {remote}/api/w/{workspace}/sync/delete        {path, expected_version}
//! ```
//!
//! Status mapping: 401/403 unauthorized, 404 not found, 409/412 version
//! conflict, 5xx retryable, any other non-2xx terminal.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsync_core::{Artifact, ArtifactMetadata, ArtifactPath, Credential, RemoteVersion};

use crate::client::{RemoteArtifact, RemoteEntry, RemoteWorkspace};
use crate::error::RemoteError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpWorkspace {
    base: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    path: ArtifactPath,
    content: String,
    #[serde(default)]
    metadata: Option<ArtifactMetadata>,
    version: RemoteVersion,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    path: &'a ArtifactPath,
    content: &'a str,
    metadata: &'a ArtifactMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_version: Option<&'a RemoteVersion>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    version: RemoteVersion,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    path: &'a ArtifactPath,
    expected_version: &'a RemoteVersion,
}

impl HttpWorkspace {
    pub fn new(remote: &str, workspace_id: &str) -> Self {
        Self {
            base: format!(
                "{}/api/w/{}/sync",
                remote.trim_end_matches('/'),
                workspace_id
            ),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn get(&self, credential: &Credential, endpoint: &str) -> ureq::Request {
        self.agent
            .get(&format!("{}/{endpoint}", self.base))
            .set("Authorization", &format!("Bearer {}", credential.token))
    }

    fn post(&self, credential: &Credential, endpoint: &str) -> ureq::Request {
        self.agent
            .post(&format!("{}/{endpoint}", self.base))
            .set("Authorization", &format!("Bearer {}", credential.token))
    }
}

impl RemoteWorkspace for HttpWorkspace {
    fn list(&self, credential: &Credential) -> Result<Vec<RemoteEntry>, RemoteError> {
        let response = self
            .get(credential, "list")
            .call()
            .map_err(|e| map_ureq(e, "list", None))?;
        let entries: Vec<RemoteEntry> = decode(response)?;
        tracing::debug!("remote listed {} artifacts", entries.len());
        Ok(entries)
    }

    fn fetch(
        &self,
        credential: &Credential,
        path: &ArtifactPath,
    ) -> Result<RemoteArtifact, RemoteError> {
        let response = self
            .get(credential, &format!("get/{}", encode_path(path)))
            .call()
            .map_err(|e| map_ureq(e, path.as_str(), None))?;
        let body: FetchResponse = decode(response)?;
        if &body.path != path {
            return Err(RemoteError::Decode(format!(
                "asked for {path}, remote returned {}",
                body.path
            )));
        }
        let artifact = into_artifact(body.path, body.content, body.metadata)?;
        Ok(RemoteArtifact {
            artifact,
            version: body.version,
        })
    }

    fn push(
        &self,
        credential: &Credential,
        artifact: &Artifact,
        expected: Option<&RemoteVersion>,
    ) -> Result<RemoteVersion, RemoteError> {
        let request = PutRequest {
            path: &artifact.path,
            content: &artifact.content,
            metadata: &artifact.metadata,
            expected_version: expected,
        };
        let response = self
            .post(credential, "put")
            .send_json(&request)
            .map_err(|e| map_ureq(e, artifact.path.as_str(), expected))?;
        let body: PutResponse = decode(response)?;
        Ok(body.version)
    }

    fn delete(
        &self,
        credential: &Credential,
        path: &ArtifactPath,
        expected: &RemoteVersion,
    ) -> Result<(), RemoteError> {
        let request = DeleteRequest {
            path,
            expected_version: expected,
        };
        self.post(credential, "delete")
            .send_json(&request)
            .map_err(|e| map_ureq(e, path.as_str(), Some(expected)))?;
        Ok(())
    }
}

/// Build an [`Artifact`] from fetched content, re-validating the remote's
/// metadata against the kind implied by the path.
fn into_artifact(
    path: ArtifactPath,
    content: String,
    metadata: Option<ArtifactMetadata>,
) -> Result<Artifact, RemoteError> {
    let mut artifact = Artifact::from_content(path, content)
        .map_err(|e| RemoteError::Decode(e.to_string()))?;
    match metadata {
        Some(remote) if remote.kind() != artifact.kind() => Err(RemoteError::Decode(format!(
            "{} is a {} locally but the remote reports {}",
            artifact.path,
            artifact.kind(),
            remote.kind()
        ))),
        Some(ArtifactMetadata::Script {
            schema: remote_schema,
            ..
        }) => {
            // Keep the remote's inferred schema; the language follows the path.
            if let ArtifactMetadata::Script { schema, .. } = &mut artifact.metadata {
                *schema = remote_schema;
            }
            Ok(artifact)
        }
        _ => Ok(artifact),
    }
}

fn decode<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, RemoteError> {
    response
        .into_json()
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

fn map_ureq(err: ureq::Error, path: &str, expected: Option<&RemoteVersion>) -> RemoteError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response.into_string().unwrap_or_default().trim().to_string();
            match status {
                401 | 403 => RemoteError::Unauthorized { status },
                404 => RemoteError::NotFound {
                    path: path.to_string(),
                },
                409 | 412 => RemoteError::VersionConflict {
                    path: path.to_string(),
                    expected: expected.cloned(),
                    found: current_version(&message),
                },
                500..=599 => RemoteError::Server { status, message },
                _ => RemoteError::Client { status, message },
            }
        }
        ureq::Error::Transport(transport) => RemoteError::Network(transport.to_string()),
    }
}

/// `path` with every segment percent-encoded, separators kept.
fn encode_path(path: &ArtifactPath) -> String {
    path.as_str()
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// Conflict bodies may carry `{"current_version": "..."}`.
fn current_version(body: &str) -> Option<RemoteVersion> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("current_version")
        .and_then(serde_json::Value::as_str)
        .map(RemoteVersion::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_joins_remote_and_workspace() {
        let ws = HttpWorkspace::new("https://wm.example.com/", "main");
        assert_eq!(ws.base_url(), "https://wm.example.com/api/w/main/sync");
    }

    #[test]
    fn put_request_omits_missing_expected_version() {
        let artifact =
            Artifact::from_content(ArtifactPath::from("f/a.ts"), "x".into()).unwrap();
        let request = PutRequest {
            path: &artifact.path,
            content: &artifact.content,
            metadata: &artifact.metadata,
            expected_version: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("expected_version").is_none());
        assert_eq!(json["metadata"]["kind"], "script");
        assert_eq!(json["metadata"]["language"], "typescript");
    }

    #[test]
    fn fetch_path_segments_are_percent_encoded() {
        assert_eq!(encode_path(&ArtifactPath::from("f/a.ts")), "f/a.ts");
        assert_eq!(
            encode_path(&ArtifactPath::from("u/me/50% off#1?.py")),
            "u/me/50%25%20off%231%3F.py"
        );
    }

    #[test]
    fn conflict_body_yields_current_version() {
        assert_eq!(
            current_version(r#"{"current_version":"v9"}"#),
            Some(RemoteVersion::from("v9"))
        );
        assert_eq!(current_version("plain text"), None);
    }

    #[test]
    fn remote_metadata_of_another_kind_is_rejected() {
        let err = into_artifact(
            ArtifactPath::from("f/a.ts"),
            "x".into(),
            Some(ArtifactMetadata::Folder),
        )
        .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[test]
    fn remote_script_schema_is_kept() {
        let schema = serde_json::json!({"type": "object"});
        let artifact = into_artifact(
            ArtifactPath::from("f/a.py"),
            "def main(): pass\n".into(),
            Some(ArtifactMetadata::Script {
                language: wsync_core::ScriptLanguage::Python,
                schema: Some(schema.clone()),
            }),
        )
        .unwrap();
        assert!(matches!(
            artifact.metadata,
            ArtifactMetadata::Script { schema: Some(ref s), .. } if *s == schema
        ));
    }
}
