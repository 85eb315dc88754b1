//! `HttpWorkspace` against a throwaway local HTTP listener.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use rstest::rstest;
use wsync_core::{Artifact, ArtifactPath, Credential, RemoteVersion};
use wsync_remote::{HttpWorkspace, RemoteError, RemoteWorkspace};

struct Seen {
    request_line: String,
    authorization: Option<String>,
    body: String,
}

/// Answer exactly one request with `status` and `body`; report what was sent.
fn one_shot(status: u16, body: &'static str) -> (String, mpsc::Receiver<Seen>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        let mut content_length = 0usize;
        let mut authorization = None;
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).expect("header");
            if header.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
                if name.eq_ignore_ascii_case("authorization") {
                    authorization = Some(value.trim().to_string());
                }
            }
        }
        let mut raw = vec![0u8; content_length];
        reader.read_exact(&mut raw).expect("body");
        let response = format!(
            "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).expect("write");
        let _ = tx.send(Seen {
            request_line: request_line.trim().to_string(),
            authorization,
            body: String::from_utf8_lossy(&raw).into_owned(),
        });
    });
    (format!("http://{addr}"), rx)
}

fn cred() -> Credential {
    Credential::new("secret-token", None)
}

fn script() -> Artifact {
    Artifact::from_content(ArtifactPath::from("f/a.ts"), "export const x = 1\n".into()).unwrap()
}

#[test]
fn list_sends_bearer_token_and_parses_entries() {
    let (remote, seen) = one_shot(
        200,
        r#"[{"path":"f/a.ts","kind":"script","digest":"ab","version":"7"},
            {"path":"f/b.flow.yaml","kind":"flow","digest":"cd","version":"8","dependencies":["f/a"]}]"#,
    );
    let ws = HttpWorkspace::new(&remote, "main");
    let entries = ws.list(&cred()).unwrap();

    let seen = seen.recv().unwrap();
    assert_eq!(seen.request_line, "GET /api/w/main/sync/list HTTP/1.1");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer secret-token"));
    assert_eq!(entries.len(), 2);
    assert!(entries[0].dependencies.is_empty());
    assert_eq!(entries[1].dependencies, vec![ArtifactPath::from("f/a")]);
}

#[test]
fn push_sends_expected_version_and_returns_new_one() {
    let (remote, seen) = one_shot(200, r#"{"version":"8"}"#);
    let ws = HttpWorkspace::new(&remote, "main");
    let version = ws
        .push(&cred(), &script(), Some(&RemoteVersion::from("7")))
        .unwrap();

    assert_eq!(version, RemoteVersion::from("8"));
    let seen = seen.recv().unwrap();
    assert_eq!(seen.request_line, "POST /api/w/main/sync/put HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&seen.body).unwrap();
    assert_eq!(body["path"], "f/a.ts");
    assert_eq!(body["expected_version"], "7");
}

#[test]
fn fetch_rebuilds_artifact_from_content() {
    let (remote, _seen) = one_shot(
        200,
        r#"{"path":"f/a.ts","content":"export const x = 1\n","version":"3"}"#,
    );
    let ws = HttpWorkspace::new(&remote, "main");
    let fetched = ws.fetch(&cred(), &ArtifactPath::from("f/a.ts")).unwrap();
    assert_eq!(fetched.artifact, script());
    assert_eq!(fetched.version, RemoteVersion::from("3"));
}

#[test]
fn fetch_encodes_reserved_characters_in_the_path() {
    let (remote, seen) = one_shot(
        200,
        r#"{"path":"f/odd#name?.ts","content":"export const x = 1\n","version":"3"}"#,
    );
    let ws = HttpWorkspace::new(&remote, "main");
    let fetched = ws.fetch(&cred(), &ArtifactPath::from("f/odd#name?.ts")).unwrap();

    let seen = seen.recv().unwrap();
    assert_eq!(
        seen.request_line,
        "GET /api/w/main/sync/get/f/odd%23name%3F.ts HTTP/1.1"
    );
    assert_eq!(fetched.artifact.path, ArtifactPath::from("f/odd#name?.ts"));
}

#[rstest]
#[case(401, "unauthorized")]
#[case(403, "unauthorized")]
#[case(404, "not_found")]
#[case(409, "conflict")]
#[case(412, "conflict")]
#[case(500, "retryable")]
#[case(503, "retryable")]
#[case(400, "terminal")]
#[case(422, "terminal")]
fn status_codes_map_to_error_classes(#[case] status: u16, #[case] class: &str) {
    let (remote, _seen) = one_shot(status, r#"{"error":"nope"}"#);
    let ws = HttpWorkspace::new(&remote, "main");
    let err = ws
        .delete(&cred(), &ArtifactPath::from("f/a.ts"), &RemoteVersion::from("1"))
        .unwrap_err();
    let actual = match &err {
        RemoteError::Unauthorized { .. } => "unauthorized",
        RemoteError::NotFound { .. } => "not_found",
        RemoteError::VersionConflict { .. } => "conflict",
        e if e.is_retryable() => "retryable",
        RemoteError::Client { .. } => "terminal",
        other => panic!("unexpected error {other:?}"),
    };
    assert_eq!(actual, class);
}

#[test]
fn unreachable_remote_is_retryable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let ws = HttpWorkspace::new(&format!("http://{addr}"), "main");
    assert!(ws.list(&cred()).unwrap_err().is_retryable());
}
