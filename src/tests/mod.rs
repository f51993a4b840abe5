use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::detector::ReturnKind;
use crate::discovery::{Discoverer, Discovery, DiscoveryError};
use crate::request::{payload, TemplateError, TemplateLoadError};
use crate::runner::{Options, Runner, RunnerError};

#[derive(Clone, Debug)]
struct CapturedRequest {
    head: String,
    body: String,
}

struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl StubServer {
    fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0)
}

async fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_string();
            let end = pos + 4 + content_length(&head);
            if buf.len() >= end {
                let body = String::from_utf8_lossy(&buf[pos + 4..end]).to_string();
                return Some(CapturedRequest { head, body });
            }
        }
    }
}

// Answers every POST with whatever `respond` returns for the request body.
async fn spawn_stub(respond: fn(&str) -> (u16, String)) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let req = match read_request(&mut stream).await {
                Some(req) => req,
                None => continue,
            };
            let (status, body) = respond(&req.body);
            seen.lock().unwrap().push(req);
            let resp = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    StubServer { addr, requests }
}

fn aura_reply(body: &str) -> (u16, String) {
    if body.contains("method\":\"getSecrets\"") {
        return (
            200,
            r#"{"actions":[{"id":"656;a","state":"SUCCESS","returnValue":"my password is secret123"}]}"#
                .to_string(),
        );
    }
    if body.contains("method\":\"getConfig\"") {
        return (
            200,
            r#"{"actions":[{"id":"656;a","state":"SUCCESS","returnValue":{"SessionId":"00D..","count":2}}]}"#
                .to_string(),
        );
    }
    if body.contains("method\":\"broken\"") {
        return (500, "<html>Service Unavailable</html>".to_string());
    }
    (
        200,
        r#"{"actions":[{"id":"656;a","state":"SUCCESS","returnValue":"hello world"}]}"#.to_string(),
    )
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("classes")).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn class(&self, name: &str, source: &str) -> &Self {
        std::fs::write(self.root().join("classes").join(format!("{name}.cls")), source).unwrap();
        self
    }

    fn package(&self, namespace: &str) -> &Self {
        std::fs::write(
            self.root().join("package.xml"),
            format!(
                "<?xml version=\"1.0\"?>\n<Package>\n  <namespacePrefix>{namespace}</namespacePrefix>\n</Package>\n"
            ),
        )
        .unwrap();
        self
    }

    fn request(&self, host: &str, body: &str) -> &Self {
        let raw = format!(
            "POST /s/sfsites/aura?r=1&aura.ApexAction.execute=1 HTTP/1.1\nHost: {host}\nCookie: sid=abc\nContent-Type: application/x-www-form-urlencoded; charset=UTF-8\nContent-Length: 999\n\n{body}"
        );
        std::fs::write(self.root().join("req.txt"), raw).unwrap();
        self
    }

    fn options(&self) -> Options {
        Options {
            classes_dir: self.root().join("classes"),
            package_xml: self.root().join("package.xml"),
            request_file: self.root().join("req.txt"),
            output_dir: self.root().join("auraenabled_responses"),
            scheme: "http".to_string(),
            timeout_seconds: 5,
            ..Options::default()
        }
    }

    fn artifacts(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.root().join("auraenabled_responses"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

#[tokio::test]
async fn single_method_end_to_end() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.class(
        "Foo",
        "public class Foo {\n    @AuraEnabled public String bar() { return 'hi'; }\n}\n",
    )
    .package("acme")
    .request(&stub.addr.to_string(), "message=OLD&aura.token=T");

    let scan = Runner::new(ws.options()).unwrap().run().await.unwrap();

    assert_eq!(scan.namespace, "acme");
    assert_eq!(scan.results.len(), 1);
    assert_eq!(
        scan.console,
        vec!["Using namespace prefix: 'acme'", "Foo.bar -> 200"]
    );
    assert_eq!(ws.artifacts(), vec!["res_Foo_bar.txt".to_string()]);

    let probe = &scan.results[0];
    assert_eq!(probe.progress_line(), "Foo.bar -> 200");
    assert!(probe.sensitive.is_empty());
    assert!(probe.request_body.contains("classname\":\"Foo\""));
    assert!(probe.request_body.contains("method\":\"bar\""));
    assert!(probe.request_body.ends_with("&aura.token=T"));

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.body, probe.request_body);
    assert!(sent
        .head
        .starts_with("POST /s/sfsites/aura?r=1&aura.ApexAction.execute=1 HTTP/1.1"));
    assert!(sent.head.to_lowercase().contains("cookie: sid=abc"));
    assert_eq!(content_length(&sent.head), sent.body.len());

    let envelope = payload::extract_envelope(&sent.body, "message").unwrap();
    assert_eq!(envelope.actions[0].params.namespace, "acme");
    assert!(!envelope.actions[0].params.cacheable);

    let artifact = std::fs::read_to_string(&probe.artifact).unwrap();
    assert!(artifact.contains("hello world"));
    assert!(!artifact.contains("SENSITIVE DATA DETECTED"));
}

#[tokio::test]
async fn flags_sensitive_return_values_and_survives_bad_replies() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.class(
        "Vault",
        r#"public with sharing class Vault {
    @AuraEnabled(cacheable=true)
    public static String getSecrets() { return null; }

    @AuraEnabled
    public static String getOne(String name) { return null; }

    @AuraEnabled
    // internal
    global static Map<String, Object> getConfig() { return null; }
}"#,
    )
    .class(
        "Admin",
        "public class Admin {\n  @AuraEnabled public static void broken() {}\n}\n",
    )
    .request(&stub.addr.to_string(), "message=OLD&aura.context=CTX&aura.token=T");

    let scan = Runner::new(ws.options()).unwrap().run().await.unwrap();

    assert_eq!(scan.namespace, "");
    let lines: Vec<String> = scan.results.iter().map(|r| r.progress_line()).collect();
    assert_eq!(
        lines,
        vec![
            "Admin.broken -> 500".to_string(),
            "Vault.getSecrets -> 200 -> sensitive: pass, password, secret".to_string(),
            "Vault.getConfig -> 200 -> sensitive: session".to_string(),
        ]
    );
    assert_eq!(stub.requests().len(), 3);

    let broken = &scan.results[0];
    assert_eq!(broken.return_value.kind(), ReturnKind::Unparsed);
    let artifact = std::fs::read_to_string(&broken.artifact).unwrap();
    assert!(artifact.contains("Could not parse returnValue. Full response:\n<html>Service Unavailable</html>"));

    let secrets = std::fs::read_to_string(&scan.results[1].artifact).unwrap();
    assert!(secrets.contains("my password is secret123"));
    assert!(secrets.contains("*** SENSITIVE DATA DETECTED: pass, password, secret ***"));

    let config = std::fs::read_to_string(&scan.results[2].artifact).unwrap();
    assert!(config.contains(r#"{"SessionId":"00D..","count":2}"#));
    assert_eq!(scan.flagged().count(), 2);
}

#[tokio::test]
async fn no_candidates_means_no_requests() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.class("Plain", "public class Plain { public String x() { return null; } }")
        .request(&stub.addr.to_string(), "message=OLD");

    let scan = Runner::new(ws.options()).unwrap().run().await.unwrap();
    assert!(scan.candidates.is_empty());
    assert!(scan.results.is_empty());
    assert_eq!(
        scan.console,
        vec!["No @AuraEnabled no-parameter methods found."]
    );
    assert!(stub.requests().is_empty());
    assert!(!ws.root().join("auraenabled_responses").exists());
}

#[tokio::test]
async fn missing_host_aborts_before_any_request() {
    let ws = Workspace::new();
    ws.class("Foo", "@AuraEnabled public String bar() {}");
    std::fs::write(
        ws.root().join("req.txt"),
        "POST /aura HTTP/1.1\nCookie: sid=abc\n\nmessage=OLD",
    )
    .unwrap();

    let err = Runner::new(ws.options()).unwrap().run().await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::RequestTemplate(TemplateLoadError::Invalid {
            source: TemplateError::MissingHostHeader,
            ..
        })
    ));
    assert!(!ws.root().join("auraenabled_responses").exists());
}

#[tokio::test]
async fn missing_field_warns_or_fails() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.class("Foo", "@AuraEnabled public String bar() {}")
        .request(&stub.addr.to_string(), "payload=OLD&aura.token=T");

    let strict = Options {
        strict_field: true,
        ..ws.options()
    };
    let err = Runner::new(strict).unwrap().run().await.unwrap_err();
    assert!(matches!(err, RunnerError::FieldNotFound { ref field } if field == "message"));
    assert!(stub.requests().is_empty());

    let scan = Runner::new(ws.options()).unwrap().run().await.unwrap();
    assert!(!scan.field_present);
    assert!(scan.console[0].starts_with("[WRN] field 'message=' not found"));
    assert_eq!(scan.console[1], "Using namespace prefix: ''");
    assert_eq!(scan.results[0].request_body, "payload=OLD&aura.token=T");
}

#[tokio::test]
async fn custom_field_name_is_spliced() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.class("Foo", "@AuraEnabled public String bar() {}")
        .request(&stub.addr.to_string(), "aura.token=T&msg=OLD");

    let options = Options {
        message_field: "msg".to_string(),
        ..ws.options()
    };
    let scan = Runner::new(options).unwrap().run().await.unwrap();
    assert!(scan.field_present);
    assert!(scan.results[0]
        .request_body
        .starts_with("aura.token=T&msg={\"actions\""));
}

#[tokio::test]
async fn transport_failures_are_recorded_or_fatal() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let ws = Workspace::new();
    ws.class("Foo", "@AuraEnabled public String bar() {}")
        .request(&addr.to_string(), "message=OLD");

    let scan = Runner::new(ws.options()).unwrap().run().await.unwrap();
    let probe = &scan.results[0];
    assert_eq!(probe.status, None);
    assert_eq!(probe.return_value.kind(), ReturnKind::TransportError);
    assert_eq!(probe.progress_line(), "Foo.bar -> ERR");
    assert_eq!(scan.console.last().unwrap(), "Foo.bar -> ERR");
    let artifact = std::fs::read_to_string(&probe.artifact).unwrap();
    assert!(artifact.contains("Request failed:"));

    let aborting = Options {
        abort_on_error: true,
        ..ws.options()
    };
    let err = Runner::new(aborting).unwrap().run().await.unwrap_err();
    assert!(matches!(err, RunnerError::Request { ref candidate, .. } if candidate == "Foo.bar"));
}

#[tokio::test]
async fn colliding_candidates_get_their_own_artifacts() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.class(
        "Foo",
        "public class Foo {\n  @AuraEnabled public static String first() {}\n  @AuraEnabled public static String second() {}\n  @AuraEnabled public static String first() {}\n}\n",
    )
    .class("A", "@AuraEnabled public static String b_c() {}")
    .class("A_b", "@AuraEnabled public static String c() {}")
    .request(&stub.addr.to_string(), "message=OLD");

    let scan = Runner::new(ws.options()).unwrap().run().await.unwrap();

    assert_eq!(scan.results.len(), 5);
    assert_eq!(stub.requests().len(), 5);
    assert_eq!(
        ws.artifacts(),
        vec![
            "res_A_b_c.txt".to_string(),
            "res_A_b_c_2.txt".to_string(),
            "res_Foo_first.txt".to_string(),
            "res_Foo_first_2.txt".to_string(),
            "res_Foo_second.txt".to_string(),
        ]
    );

    let mut paths: Vec<_> = scan.results.iter().map(|r| r.artifact.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 5);

    let a = std::fs::read_to_string(&scan.results[0].artifact).unwrap();
    assert!(a.contains("classname\":\"A\""));
    let a_b = std::fs::read_to_string(&scan.results[1].artifact).unwrap();
    assert!(a_b.contains("classname\":\"A_b\""));
}

struct FixedDiscoverer;

impl Discoverer for FixedDiscoverer {
    fn discover(&self, _root: &Path) -> Result<Discovery, DiscoveryError> {
        let mut found = Discovery::default();
        found.insert("Injected", vec!["run".to_string()]);
        Ok(found)
    }
}

#[tokio::test]
async fn discoverer_can_be_swapped() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.request(&stub.addr.to_string(), "message=OLD");

    let scan = Runner::new(ws.options())
        .unwrap()
        .with_discoverer(FixedDiscoverer)
        .run()
        .await
        .unwrap();
    assert_eq!(scan.results.len(), 1);
    assert_eq!(scan.results[0].progress_line(), "Injected.run -> 200");
    assert_eq!(ws.artifacts(), vec!["res_Injected_run.txt".to_string()]);
}

#[tokio::test]
async fn summary_report_lists_every_probe() {
    let stub = spawn_stub(aura_reply).await;
    let ws = Workspace::new();
    ws.class(
        "Vault",
        "@AuraEnabled public static String getSecrets() {}\n@AuraEnabled public static String other() {}",
    )
    .request(&stub.addr.to_string(), "message=OLD");

    let scan = Runner::new(ws.options()).unwrap().run().await.unwrap();

    let text = String::from_utf8(crate::output::render(
        crate::output::OutputFormat::Text,
        &scan.results,
    ))
    .unwrap();
    assert_eq!(
        text,
        "Vault.getSecrets -> 200 -> sensitive: pass, password, secret\nVault.other -> 200\n"
    );

    let json: serde_json::Value = serde_json::from_slice(&crate::output::render(
        crate::output::OutputFormat::Json,
        &scan.results,
    ))
    .unwrap();
    assert_eq!(json[0]["class_name"], "Vault");
    assert_eq!(json[0]["kind"], "parsed");
    assert_eq!(json[1]["sensitive"].as_array().unwrap().len(), 0);
}
