//! HTTP adapters against a minimal in-process server.

use edagate_backends::{HttpSink, HttpToolService};
use edagate_core::{
    BackendClient, BackendConfig, BackendKind, BackendOutcome, DesignBundle, EndpointConfig,
    EvaluationOptions, HealthStatus, ResultSink, SinkConfig, SinkError, SourceFile, SourceKind,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A request as seen by the test server.
#[derive(Debug, Clone)]
struct Seen {
    head: String,
    body: Vec<u8>,
}

/// Serve `responses` in order, one per connection, recording each request.
async fn serve(responses: Vec<(u16, String)>) -> (String, Arc<Mutex<Vec<Seen>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            log.lock().unwrap().push(request);

            let reply = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{addr}"), seen)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Seen {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Seen {
        head,
        body: buf[head_end..].to_vec(),
    }
}

fn bundle() -> DesignBundle {
    DesignBundle::new(
        "adder",
        vec![
            SourceFile::new("adder.v", "module adder; endmodule", SourceKind::Rtl),
            SourceFile::new("tb_adder.v", "module tb_adder; endmodule", SourceKind::Testbench),
        ],
        EvaluationOptions::default(),
    )
}

fn config(kind: BackendKind) -> BackendConfig {
    BackendConfig {
        kind,
        timeout: Duration::from_secs(10),
        retry_delay: Duration::from_millis(10),
        max_retries: 1,
    }
}

fn service(kind: BackendKind, url: &str) -> Arc<HttpToolService> {
    Arc::new(HttpToolService::new(kind, &EndpointConfig::new(url, 10), Duration::from_secs(2)).unwrap())
}

#[tokio::test]
async fn simulator_report_roundtrip() {
    let (url, seen) = serve(vec![(
        200,
        r#"{"success": true, "results": {"passed_assertions": 9, "total_assertions": 10}, "evaluator_log": "sim done"}"#
            .to_string(),
    )])
    .await;
    let client = BackendClient::new(service(BackendKind::Verilator, &url));

    let outcome = client.invoke(&bundle(), &config(BackendKind::Verilator)).await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(outcome.logs(), Some("sim done"));
    let metrics = outcome.report().unwrap().metrics();
    assert_eq!(metrics.functionality, Some(0.9));

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].head.starts_with("POST /simulate_and_evaluate "));
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["top_module"], "adder");
    assert_eq!(body["sources"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn service_unavailable_is_retried_once() {
    let (url, seen) = serve(vec![
        (503, "busy".to_string()),
        (200, r#"{"success": true, "area": 42.0}"#.to_string()),
    ])
    .await;
    let client = BackendClient::new(service(BackendKind::Yosys, &url));

    let outcome = client.invoke(&bundle(), &config(BackendKind::Yosys)).await;
    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(outcome.attempts(), 2);

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(body["sources"].as_array().unwrap().len(), 1, "no testbench for synthesis");
}

#[tokio::test]
async fn tool_failure_envelope() {
    let (url, _) = serve(vec![(
        200,
        r#"{"success": false, "error_message": "Simulation failed", "exit_code": 2, "logs": "tb_adder.v:12 assertion"}"#
            .to_string(),
    )])
    .await;
    let client = BackendClient::new(service(BackendKind::Icarus, &url));

    match client.invoke(&bundle(), &config(BackendKind::Icarus)).await {
        BackendOutcome::ToolFailure {
            kind,
            message,
            exit_code,
            logs,
            attempts,
        } => {
            assert_eq!(kind, "tool_error");
            assert_eq!(message, "Simulation failed");
            assert_eq!(exit_code, Some(2));
            assert!(logs.unwrap().contains("assertion"));
            assert_eq!(attempts, 1);
        }
        other => panic!("expected tool failure, got {other:?}"),
    }
}

#[tokio::test]
async fn connection_refused_is_unavailable() {
    let client = BackendClient::new(service(BackendKind::Openlane, "http://127.0.0.1:1"));
    match client.invoke(&bundle(), &config(BackendKind::Openlane)).await {
        BackendOutcome::Unavailable { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn health_check_states() {
    let (url, seen) = serve(vec![
        (200, r#"{"status": "healthy", "tool": "yosys 0.38"}"#.to_string()),
        (500, "{}".to_string()),
    ])
    .await;
    let svc = service(BackendKind::Yosys, &url);
    let client = BackendClient::new(svc);

    match client.health().await {
        HealthStatus::Healthy { details } => assert_eq!(details["tool"], "yosys 0.38"),
        other => panic!("expected healthy, got {other:?}"),
    }
    assert_eq!(client.health().await, HealthStatus::Unhealthy { http_status: 500 });
    assert!(seen.lock().unwrap()[0].head.starts_with("GET /health "));

    let down = BackendClient::new(service(BackendKind::Yosys, "http://127.0.0.1:1"));
    assert_eq!(down.health().await.label(), "unreachable");
}

#[tokio::test]
async fn sink_put_with_bearer_token() {
    let (url, seen) = serve(vec![(200, "{}".to_string()), (403, "AccessDenied".to_string())]).await;
    let sink = HttpSink::new(&SinkConfig {
        url: url.clone(),
        token: Some("s3cret".to_string()),
    })
    .unwrap();

    let location = sink.upload("eda_results/abc.zip", vec![0x50, 0x4b, 0x03, 0x04]).await.unwrap();
    assert_eq!(location, format!("{url}/eda_results/abc.zip"));

    let requests = seen.lock().unwrap().clone();
    assert!(requests[0].head.starts_with("PUT /eda_results/abc.zip "));
    assert!(requests[0]
        .head
        .to_ascii_lowercase()
        .contains("authorization: bearer s3cret"));
    assert_eq!(requests[0].body, vec![0x50, 0x4b, 0x03, 0x04]);

    let err = sink.upload("eda_results/def.zip", vec![]).await.unwrap_err();
    assert_eq!(
        err,
        SinkError::Rejected {
            status: 403,
            body: "AccessDenied".to_string()
        }
    );
}
