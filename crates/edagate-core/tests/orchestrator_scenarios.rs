//! End-to-end orchestration scenarios against scripted tool services.

use edagate_core::fakes::{MemorySink, ScriptedService, Step};
use edagate_core::{
    BackendKind, BackendOutcome, DesignBundle, EvaluationOptions, GatewayConfig, GatewayContext,
    HealthStatus, Orchestrator, ReferenceBaseline, RejectReason, ResultSink, SourceFile,
    SourceKind, ToolResponse, ToolService, TransportError, UnpackLimits,
};
use serde_json::json;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.results_dir = dir.join("results");
    config.retry_delay_ms = 10;
    config.scoring.baseline = ReferenceBaseline {
        area: Some(1000.0),
        delay_ns: None,
        power_mw: None,
    };
    config
}

fn context(
    config: GatewayConfig,
    services: Vec<Arc<ScriptedService>>,
    sink: Option<Arc<dyn ResultSink>>,
) -> Arc<GatewayContext> {
    let services: Vec<Arc<dyn ToolService>> = services
        .into_iter()
        .map(|s| s as Arc<dyn ToolService>)
        .collect();
    Arc::new(GatewayContext::new(config, services, sink))
}

fn bundle(top: &str, options: EvaluationOptions) -> DesignBundle {
    DesignBundle::new(
        top,
        vec![
            SourceFile::new(
                format!("rtl/{top}.v"),
                format!("module {top}(input a, output b); assign b = a; endmodule"),
                SourceKind::Rtl,
            ),
            SourceFile::new(
                format!("tb/tb_{top}.v"),
                format!("module tb_{top}; {top} dut(); endmodule"),
                SourceKind::Testbench,
            ),
        ],
        options,
    )
}

fn passing_sim() -> serde_json::Value {
    json!({ "passed_assertions": 10, "total_assertions": 10 })
}

fn read_entry(zip_path: &Path, name: &str) -> String {
    let bytes = std::fs::read(zip_path).unwrap();
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut text = String::new();
    zip.by_name(name).unwrap().read_to_string(&mut text).unwrap();
    text
}

#[tokio::test(start_paused = true)]
async fn scenario_a_passing_testbench_without_ppa() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let orchestrator = Orchestrator::new(context(config(dir.path()), vec![verilator.clone()], None));

    let options = EvaluationOptions::default().with_backends([BackendKind::Verilator]);
    let result = orchestrator.evaluate(bundle("adder", options)).await.unwrap();

    assert_eq!(result.scores.functionality_score, 1.0);
    assert_eq!(result.scores.area_score, None);
    assert_eq!(result.scores.delay_score, None);
    assert_eq!(result.scores.power_score, None);
    assert!((result.scores.overall_score - 1.0).abs() < 1e-12);
    assert_eq!(result.enabled_backends(), vec![BackendKind::Verilator]);
    assert_eq!(verilator.calls(), 1);

    let archive = result.archive.as_ref().unwrap();
    assert!(archive.local_path.exists());
    assert!(result.warnings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn scenario_b_simulation_timeout_with_physical_design() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::delayed(
        BackendKind::Verilator,
        Duration::from_secs(120),
        passing_sim(),
    ));
    let openlane = Arc::new(ScriptedService::responding(
        BackendKind::Openlane,
        json!({ "success": true, "area_um2": 1000.0 }),
    ));
    let orchestrator = Orchestrator::new(context(
        config(dir.path()),
        vec![verilator, openlane],
        None,
    ));

    let options = EvaluationOptions::default()
        .with_backends([BackendKind::Verilator, BackendKind::Openlane])
        .with_timeout_override(BackendKind::Verilator, 30);
    let result = orchestrator.evaluate(bundle("alu", options)).await.unwrap();

    assert!(matches!(
        result.outcomes[&BackendKind::Verilator],
        BackendOutcome::Timeout { .. }
    ));
    assert!(result.outcomes[&BackendKind::Openlane].is_success());
    assert_eq!(result.scores.functionality_score, 0.0);
    assert_eq!(result.scores.area_score, Some(1.0));
    assert_eq!(result.scores.ppa_sources, vec![BackendKind::Openlane]);

    // functionality 0.5 * 0 + area 0.15 * 1, renormalized over 0.65
    let expected = 0.15 / 0.65;
    assert!((result.scores.overall_score - expected).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_oversized_archive_never_reaches_backends() {
    let dir = TempDir::new().unwrap();
    let services: Vec<Arc<ScriptedService>> = BackendKind::ALL
        .into_iter()
        .map(|kind| Arc::new(ScriptedService::responding(kind, passing_sim())))
        .collect();
    let mut cfg = config(dir.path());
    cfg.limits = UnpackLimits {
        max_archive_bytes: 64,
        ..UnpackLimits::default()
    };
    let orchestrator = Orchestrator::new(context(cfg, services.clone(), None));

    let err = orchestrator.submit(vec![0u8; 65]).await.unwrap_err();
    assert_eq!(err.as_invalid().map(|e| e.reason), Some(RejectReason::TooLarge));
    assert!(services.iter().all(|s| s.calls() == 0));
    assert!(!dir.path().join("results").exists());
}

#[tokio::test(start_paused = true)]
async fn scenario_d_concurrent_submissions_stay_isolated() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::delayed(
        BackendKind::Verilator,
        Duration::from_millis(500),
        passing_sim(),
    ));
    let yosys = Arc::new(ScriptedService::responding(
        BackendKind::Yosys,
        json!({ "area": 500.0 }),
    ));
    let orchestrator = Orchestrator::new(context(
        config(dir.path()),
        vec![verilator.clone(), yosys],
        None,
    ));

    let options = EvaluationOptions::default().with_backends([BackendKind::Yosys, BackendKind::Verilator]);
    let first = bundle("uart_tx", options.clone());
    let second = bundle("spi_master", options);
    let (first_id, second_id) = (first.id(), second.id());
    let (first_digest, second_digest) = (first.digest().to_string(), second.digest().to_string());

    let (a, b) = tokio::join!(orchestrator.evaluate(first), orchestrator.evaluate(second));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.submission_id, first_id);
    assert_eq!(a.top_module, "uart_tx");
    assert_eq!(a.bundle_digest, first_digest);
    assert_eq!(b.submission_id, second_id);
    assert_eq!(b.top_module, "spi_master");
    assert_eq!(b.bundle_digest, second_digest);
    assert_ne!(
        a.archive.as_ref().unwrap().local_path,
        b.archive.as_ref().unwrap().local_path
    );

    let requests = verilator.requests();
    assert_eq!(requests.len(), 2);
    for request in requests {
        let expected_top = if request.submission_id == first_id {
            "uart_tx"
        } else {
            assert_eq!(request.submission_id, second_id);
            "spi_master"
        };
        assert_eq!(request.top_module, expected_top);
        assert!(request.sources.iter().all(|s| s.name.contains(expected_top)));
    }

    let archived = read_entry(&a.archive.as_ref().unwrap().local_path, "result.json");
    assert!(archived.contains("uart_tx"));
    assert!(!archived.contains("spi_master"));
}

#[tokio::test(start_paused = true)]
async fn total_backend_failure_still_yields_result() {
    let dir = TempDir::new().unwrap();
    let services: Vec<Arc<ScriptedService>> = BackendKind::ALL
        .into_iter()
        .map(|kind| Arc::new(ScriptedService::unreachable(kind)))
        .collect();
    let orchestrator = Orchestrator::new(context(config(dir.path()), services.clone(), None));

    let result = orchestrator
        .evaluate(bundle("fifo", EvaluationOptions::default()))
        .await
        .unwrap();

    assert_eq!(result.outcomes.len(), 4);
    for outcome in result.outcomes.values() {
        assert!(matches!(outcome, BackendOutcome::Unavailable { attempts: 2, .. }));
    }
    assert!(services.iter().all(|s| s.calls() == 2));
    assert_eq!(result.scores.functionality_score, 0.0);
    assert_eq!(result.scores.overall_score, 0.0);
    assert!(result.archive.unwrap().local_path.exists());
}

#[tokio::test(start_paused = true)]
async fn missing_client_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let orchestrator = Orchestrator::new(context(config(dir.path()), vec![verilator], None));

    let options = EvaluationOptions::default().with_backends([BackendKind::Verilator, BackendKind::Yosys]);
    let result = orchestrator.evaluate(bundle("mux", options)).await.unwrap();

    match &result.outcomes[&BackendKind::Yosys] {
        BackendOutcome::Unavailable { reason, attempts } => {
            assert_eq!(*attempts, 0);
            assert!(reason.contains("no client"));
        }
        other => panic!("expected unavailable, got {other:?}"),
    }
    assert_eq!(result.scores.functionality_score, 1.0);
}

#[tokio::test(start_paused = true)]
async fn disabled_simulators_are_restored_with_warning() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let yosys = Arc::new(ScriptedService::responding(BackendKind::Yosys, json!({ "area": 2000.0 })));
    let orchestrator = Orchestrator::new(context(
        config(dir.path()),
        vec![verilator.clone(), yosys],
        None,
    ));

    let options = EvaluationOptions::default().with_backends([BackendKind::Yosys]);
    let result = orchestrator.evaluate(bundle("counter", options)).await.unwrap();

    assert_eq!(verilator.calls(), 1);
    assert!(result.outcomes.contains_key(&BackendKind::Verilator));
    assert!(result.warnings.iter().any(|w| w.contains("verilator")));
    assert_eq!(result.scores.area_score, Some(0.5));
    assert_eq!(result.scores.ppa_sources, vec![BackendKind::Yosys]);

    let archived = read_entry(&result.archive.as_ref().unwrap().local_path, "result.json");
    let archived: serde_json::Value = serde_json::from_str(&archived).unwrap();
    assert_eq!(archived["warnings"], json!(result.warnings));
}

#[tokio::test(start_paused = true)]
async fn slow_backend_does_not_delay_fast_one() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::delayed(
        BackendKind::Verilator,
        Duration::from_secs(1),
        passing_sim(),
    ));
    let openlane = Arc::new(ScriptedService::delayed(
        BackendKind::Openlane,
        Duration::from_secs(100),
        json!({ "area_um2": 800.0 }),
    ));
    let orchestrator = Orchestrator::new(context(
        config(dir.path()),
        vec![verilator, openlane],
        None,
    ));

    let options = EvaluationOptions::default().with_backends([BackendKind::Verilator, BackendKind::Openlane]);
    let start = tokio::time::Instant::now();
    let result = orchestrator.evaluate(bundle("dsp", options)).await.unwrap();
    let elapsed = start.elapsed();

    match &result.outcomes[&BackendKind::Verilator] {
        BackendOutcome::Success { elapsed_ms, .. } => assert!(*elapsed_ms < 2_000),
        other => panic!("expected success, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_secs(100));
    assert!(elapsed < Duration::from_secs(101));
}

#[tokio::test(start_paused = true)]
async fn fast_mode_skips_openlane() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let openlane = Arc::new(ScriptedService::responding(
        BackendKind::Openlane,
        json!({ "area_um2": 1.0 }),
    ));
    let orchestrator = Orchestrator::new(context(
        config(dir.path()),
        vec![verilator, openlane.clone()],
        None,
    ));

    let options = EvaluationOptions {
        fast_mode: true,
        ..EvaluationOptions::default().with_backends([BackendKind::Verilator, BackendKind::Openlane])
    };
    let result = orchestrator.evaluate(bundle("alu", options)).await.unwrap();

    assert_eq!(openlane.calls(), 0);
    assert!(!result.outcomes.contains_key(&BackendKind::Openlane));
}

#[tokio::test(start_paused = true)]
async fn retry_recovers_transient_outage() {
    let dir = TempDir::new().unwrap();
    let icarus = Arc::new(ScriptedService::scripted(
        BackendKind::Icarus,
        vec![
            Step::Fail(TransportError::Status(503)),
            Step::Respond(ToolResponse::report(json!({
                "simulation_output": "ASSERT PASS: reset\nASSERT FAIL: overflow\n"
            }))),
        ],
    ));
    let orchestrator = Orchestrator::new(context(config(dir.path()), vec![icarus.clone()], None));

    let options = EvaluationOptions::default().with_backends([BackendKind::Icarus]);
    let result = orchestrator.evaluate(bundle("pwm", options)).await.unwrap();

    assert_eq!(icarus.calls(), 2);
    assert_eq!(result.outcomes[&BackendKind::Icarus].attempts(), 2);
    assert_eq!(result.scores.functionality_score, 0.5);
}

#[tokio::test(start_paused = true)]
async fn sink_failure_is_a_warning() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let sink: Arc<dyn ResultSink> = Arc::new(MemorySink::failing());
    let orchestrator = Orchestrator::new(context(config(dir.path()), vec![verilator], Some(sink)));

    let options = EvaluationOptions::default().with_backends([BackendKind::Verilator]);
    let result = orchestrator.evaluate(bundle("adder", options)).await.unwrap();

    let archive = result.archive.as_ref().unwrap();
    assert!(archive.local_path.exists());
    assert!(archive.remote.is_none());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.scores.overall_score, 1.0);
}

#[tokio::test(start_paused = true)]
async fn sink_receives_archive() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(context(
        config(dir.path()),
        vec![verilator],
        Some(sink.clone() as Arc<dyn ResultSink>),
    ));

    let options = EvaluationOptions::default().with_backends([BackendKind::Verilator]);
    let result = orchestrator.evaluate(bundle("adder", options)).await.unwrap();

    let key = format!("eda_results/{}.zip", result.submission_id);
    assert!(sink.get(&key).is_some());
    assert_eq!(
        result.archive.unwrap().remote,
        Some(format!("memory://{}", key))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_run_still_archives() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::delayed(
        BackendKind::Verilator,
        Duration::from_millis(200),
        passing_sim(),
    ));
    let ctx = context(config(dir.path()), vec![verilator], None);
    let orchestrator = Orchestrator::new(Arc::clone(&ctx));

    let options = EvaluationOptions::default().with_backends([BackendKind::Verilator]);
    let design = bundle("abandoned", options);
    let id = design.id();

    let waited = tokio::time::timeout(Duration::from_millis(20), orchestrator.evaluate(design)).await;
    assert!(waited.is_err());
    assert!(ctx.registry().contains(id));

    let expected = dir.path().join("results").join(format!("{id}.zip"));
    let mut archived = false;
    for _ in 0..100 {
        if expected.exists() && ctx.registry().is_empty() {
            archived = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(archived, "abandoned run was not archived");
}

#[tokio::test(start_paused = true)]
async fn submit_unpacks_and_evaluates() {
    let dir = TempDir::new().unwrap();
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let orchestrator = Orchestrator::new(context(config(dir.path()), vec![verilator.clone()], None));

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    zip.start_file("options.json", options).unwrap();
    zip.write_all(br#"{"top_module": "adder", "enabled_backends": ["verilator"]}"#)
        .unwrap();
    zip.start_file("adder.v", options).unwrap();
    zip.write_all(b"module adder; endmodule").unwrap();
    zip.start_file("tb/tb_adder.v", options).unwrap();
    zip.write_all(b"module tb_adder; endmodule").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let result = orchestrator.submit(bytes).await.unwrap();
    assert_eq!(result.top_module, "adder");
    assert_eq!(result.scores.functionality_score, 1.0);
    assert_eq!(verilator.requests()[0].sources.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn health_checks_every_backend() {
    let dir = TempDir::new().unwrap();
    let yosys = Arc::new(
        ScriptedService::responding(BackendKind::Yosys, json!({}))
            .with_health(HealthStatus::Unhealthy { http_status: 500 }),
    );
    let verilator = Arc::new(ScriptedService::responding(
        BackendKind::Verilator,
        passing_sim(),
    ));
    let orchestrator = Orchestrator::new(context(config(dir.path()), vec![yosys, verilator], None));

    let health = orchestrator.health().await;
    assert_eq!(health.len(), 2);
    assert_eq!(health[&BackendKind::Yosys].label(), "unhealthy");
    assert!(health[&BackendKind::Verilator].is_healthy());
}
