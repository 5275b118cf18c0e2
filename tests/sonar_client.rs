//! Quality-gate client and token authority against an in-process HTTP stub.

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use sonar_gatekeeper::sonar::{
    resolve_token, BasicCredentials, QualityGateApi, QualityGateStatus, SonarClient, TokenSources,
};
use sonar_gatekeeper::SonarError;

/// A recorded request: request line plus lower-cased header lines and body.
#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    target: String,
    head: String,
    body: String,
}

type Route = fn(&str, &str) -> (u16, String);

struct Stub {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Stub {
    async fn start(route: Route) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    serve(stream, route, recorded).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("lock not poisoned").clone()
    }

    fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.target.starts_with(path)).count()
    }
}

async fn serve(mut stream: TcpStream, route: Route, recorded: Arc<Mutex<Vec<Recorded>>>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let Ok(n) = stream.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }
    let body = String::from_utf8_lossy(&buffer[header_end..]).to_string();

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();

    let (status, response_body) = route(&method, &target);
    recorded.lock().expect("lock not poisoned").push(Recorded {
        method,
        target,
        head: head.to_lowercase(),
        body,
    });

    let response = format!(
        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        response_body.len(),
        response_body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn sonar_routes(_method: &str, target: &str) -> (u16, String) {
    let path = target.split('?').next().unwrap_or_default();
    match path {
        "/api/qualitygates/project_status" if target.contains("projectKey=missing") => (
            404,
            r#"{"errors":[{"msg":"Project 'missing' not found"}]}"#.to_string(),
        ),
        "/api/qualitygates/project_status" => (
            200,
            r#"{"projectStatus":{"status":"ERROR","conditions":[{"status":"ERROR","metricKey":"new_violations","comparator":"GT","errorThreshold":"0","actualValue":"2"}],"ignoredConditions":false}}"#.to_string(),
        ),
        "/api/issues/search" => (
            200,
            r#"{"total":1,"p":2,"ps":100,"paging":{"pageIndex":2,"pageSize":100,"total":1},"issues":[{"key":"AX-1","rule":"typescript:S3504","component":"shop:src/a.ts","line":3,"message":"Unexpected var","impacts":[{"softwareQuality":"MAINTAINABILITY","severity":"LOW"}]}]}"#.to_string(),
        ),
        "/api/rules/search" if target.contains("unknown") => (200, r#"{"total":0,"p":1,"ps":1,"rules":[]}"#.to_string()),
        "/api/rules/search" => (
            200,
            r#"{"total":1,"p":1,"ps":1,"rules":[{"key":"typescript:S3504","name":"Variables should be declared with let or const"}]}"#.to_string(),
        ),
        "/api/system/status" => (200, r#"{"status":"UP"}"#.to_string()),
        "/api/broken" => (200, "not json".to_string()),
        _ => (401, String::new()),
    }
}

#[tokio::test]
async fn test_project_status_sends_bearer_token_and_parses_gate() {
    let stub = Stub::start(sonar_routes).await;
    let client = SonarClient::new(&format!("{}/", stub.base_url), "squ_tok");

    let status = client.project_status("shop").await.expect("status");

    assert_eq!(status.status, QualityGateStatus::Error);
    assert_eq!(status.conditions.len(), 1);
    assert_eq!(status.conditions[0].metric_key, "new_violations");

    let requests = stub.requests();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/api/qualitygates/project_status?projectKey=shop");
    assert!(requests[0].head.contains("authorization: bearer squ_tok"));
}

#[tokio::test]
async fn test_search_issues_sends_paging_parameters() {
    let stub = Stub::start(sonar_routes).await;
    let client = SonarClient::new(&stub.base_url, "squ_tok");

    let page = client.search_issues("shop", 2, 100).await.expect("issues");

    assert_eq!(page.total, 1);
    assert_eq!(page.issues[0].key, "AX-1");
    assert_eq!(page.issues[0].line, Some(3));
    assert_eq!(
        stub.requests()[0].target,
        "/api/issues/search?componentKeys=shop&resolved=false&ps=100&p=2"
    );
}

#[tokio::test]
async fn test_find_rule_found_and_missing() {
    let stub = Stub::start(sonar_routes).await;
    let client = SonarClient::new(&stub.base_url, "squ_tok");

    let rule = client.find_rule("typescript:S3504").await.expect("lookup");
    assert_eq!(rule.expect("rule exists").name, "Variables should be declared with let or const");

    let missing = client.find_rule("unknown:S1").await.expect("lookup");
    assert!(missing.is_none());

    assert!(stub.requests()[0].target.contains("rule_key=typescript%3AS3504"));
    assert!(stub.requests()[0].target.ends_with("ps=1"));
}

#[tokio::test]
async fn test_not_found_carries_status_endpoint_and_details() {
    let stub = Stub::start(sonar_routes).await;
    let client = SonarClient::new(&stub.base_url, "squ_tok");

    let err = client.project_status("missing").await.unwrap_err();

    match err {
        SonarError::Api {
            status,
            endpoint,
            message,
        } => {
            assert_eq!(status, 404);
            assert_eq!(endpoint, "/api/qualitygates/project_status");
            assert_eq!(
                message,
                "Resource not found: /api/qualitygates/project_status - Project 'missing' not found"
            );
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_and_undecodable_responses() {
    let stub = Stub::start(sonar_routes).await;
    let client = SonarClient::new(&stub.base_url, "squ_tok");

    let err = client.get::<serde_json::Value>("/api/elsewhere", &[]).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.to_string(), "Authentication failed - check SONAR_TOKEN");

    let err = client.get::<serde_json::Value>("/api/broken", &[]).await.unwrap_err();
    assert!(matches!(err, SonarError::Decode { .. }));
}

#[tokio::test]
async fn test_ping() {
    let stub = Stub::start(sonar_routes).await;
    assert!(SonarClient::new(&stub.base_url, "squ_tok").ping().await);
    assert!(stub.requests()[0].head.contains("authorization: bearer squ_tok"));
}

#[tokio::test]
async fn test_empty_token_sends_no_authorization_header() {
    let stub = Stub::start(sonar_routes).await;
    let client = SonarClient::new(&stub.base_url, "");

    assert!(client.ping().await);
    client.project_status("shop").await.expect("status");

    let requests = stub.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| !r.head.contains("authorization:")));
}

fn token_routes(_method: &str, target: &str) -> (u16, String) {
    match target {
        "/api/authentication/validate" => (200, r#"{"valid":false}"#.to_string()),
        "/api/user_tokens/revoke" => (204, String::new()),
        "/api/user_tokens/generate" => (
            200,
            r#"{"login":"admin","name":"sonar-gatekeeper-auto","token":"squ_fresh"}"#.to_string(),
        ),
        _ => (404, String::new()),
    }
}

#[tokio::test]
async fn test_invalid_cached_token_is_regenerated_and_cached() {
    let stub = Stub::start(token_routes).await;
    let dir = TempDir::new().expect("tempdir");
    let cache_path = dir.path().join("sonar-token");
    std::fs::write(&cache_path, "squ_stale\n").expect("write cache");

    let sources = TokenSources {
        explicit_token: None,
        shared_path: dir.path().join("absent"),
        cache_path: cache_path.clone(),
    };
    let token = resolve_token(&stub.base_url, sources, BasicCredentials::default())
        .await
        .expect("token resolved");

    assert_eq!(token, "squ_fresh");
    assert_eq!(std::fs::read_to_string(&cache_path).expect("cache"), "squ_fresh");
    assert_eq!(stub.count("/api/authentication/validate"), 1);
    assert_eq!(stub.count("/api/user_tokens/generate"), 1);

    let generate = stub
        .requests()
        .into_iter()
        .find(|r| r.target == "/api/user_tokens/generate")
        .expect("generate request");
    assert_eq!(generate.method, "POST");
    assert!(generate.head.contains("authorization: basic "));
    assert_eq!(generate.body, "name=sonar-gatekeeper-auto");
}

#[tokio::test]
async fn test_explicit_token_makes_no_requests() {
    let stub = Stub::start(token_routes).await;
    let sources = TokenSources {
        explicit_token: Some("squ_given".to_string()),
        ..TokenSources::default()
    };

    let token = resolve_token(&stub.base_url, sources, BasicCredentials::default())
        .await
        .expect("token resolved");

    assert_eq!(token, "squ_given");
    assert!(stub.requests().is_empty());
}
