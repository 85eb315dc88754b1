//! Parameterised kind inference and digest-normalization tests.
//!
//! Each `#[case]` is isolated: no shared state.

use rstest::rstest;
use wsync_core::{digest, Artifact, ArtifactKind, ArtifactPath, ScriptLanguage};

// ---------------------------------------------------------------------------
// Kind inference
// ---------------------------------------------------------------------------

#[rstest]
#[case("f/etl/nightly.flow.yaml", Some(ArtifactKind::Flow))]
#[case("f/etl/nightly.flow.json", Some(ArtifactKind::Flow))]
#[case("f/ui/dash.app.yaml", Some(ArtifactKind::App))]
#[case("f/db/main.resource.yaml", Some(ArtifactKind::Resource))]
#[case("pg.resource-type.yaml", Some(ArtifactKind::ResourceType))]
#[case("f/x/token.variable.json", Some(ArtifactKind::Variable))]
#[case("f/x/hourly.schedule.yaml", Some(ArtifactKind::Schedule))]
#[case("f/x/folder.meta.yaml", Some(ArtifactKind::Folder))]
#[case("scripts/a.ts", Some(ArtifactKind::Script))]
#[case("f/x/job.py", Some(ArtifactKind::Script))]
#[case("flows/f.yaml", Some(ArtifactKind::Flow))]
#[case("apps/dash.json", Some(ArtifactKind::App))]
#[case("variables/v.yaml", Some(ArtifactKind::Variable))]
#[case("res/x.json", Some(ArtifactKind::Resource))]
#[case("notes.yml", Some(ArtifactKind::Resource))]
#[case("README.md", None)]
#[case("Makefile", None)]
fn infers_kind(#[case] path: &str, #[case] expected: Option<ArtifactKind>) {
    assert_eq!(ArtifactKind::infer(&ArtifactPath::from(path)), expected);
}

#[rstest]
#[case("a.ts", ScriptLanguage::TypeScript)]
#[case("a.js", ScriptLanguage::JavaScript)]
#[case("a.py", ScriptLanguage::Python)]
#[case("a.go", ScriptLanguage::Go)]
#[case("a.sh", ScriptLanguage::Bash)]
#[case("a.sql", ScriptLanguage::Sql)]
#[case("a.gql", ScriptLanguage::GraphQl)]
#[case("a.ps1", ScriptLanguage::PowerShell)]
#[case("a.php", ScriptLanguage::Php)]
#[case("a.rs", ScriptLanguage::Rust)]
#[case("a.cs", ScriptLanguage::CSharp)]
#[case("a.nu", ScriptLanguage::Nu)]
#[case("a.java", ScriptLanguage::Java)]
fn infers_script_language(#[case] path: &str, #[case] language: ScriptLanguage) {
    let art = Artifact::from_content(ArtifactPath::from(path), String::new()).expect("artifact");
    assert_eq!(art.metadata.language(), Some(language));
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

#[rstest]
#[case("x.resource.json", r#"{"a": 1, "b": [1, 2]}"#, r#"{"b":[1,2],"a":1}"#)]
#[case("x.resource.yaml", "a: 1\nb:\n  - 1\n  - 2\n", "b: [1, 2]\na: 1\n")]
#[case("x.resource.yaml", "a: 1\r\nb: 2\r\n", "a: 1\nb: 2\n")]
fn equivalent_data_content_shares_digest(
    #[case] path: &str,
    #[case] left: &str,
    #[case] right: &str,
) {
    let l = Artifact::from_content(ArtifactPath::from(path), left.into()).expect("left");
    let r = Artifact::from_content(ArtifactPath::from(path), right.into()).expect("right");
    assert_eq!(
        digest::digest(&l).expect("digest"),
        digest::digest(&r).expect("digest")
    );
}

#[test]
fn script_kind_is_format_sensitive() {
    assert!(!ArtifactKind::Script.is_format_insensitive());
    assert!(ArtifactKind::Flow.is_format_insensitive());
}
