use std::sync::Arc;
use std::time::Duration;

use dogpush_core::{DatadogReporter, PassOutcome, PassStage, ReporterConfig, RuntimeSnapshot};
use bytes::Bytes;
use dogpush_http::{
    HttpClient, HttpErrorKind, HttpResponse, HttpTransport, ec2_instance_id_from,
};
use dogpush_metrics::{MetricName, Registry};
use dogpush_testserver::{IntakeOptions, TestServer};

fn name(group: &str, type_: &str, n: &str) -> MetricName {
    MetricName::new(group, type_, n).unwrap_or_else(|e| panic!("valid name: {e}"))
}

async fn intake(api_key: &str) -> TestServer {
    TestServer::start_with(IntakeOptions {
        api_key: Some(api_key.to_string()),
        instance_id: Some("i-0abc123".to_string()),
    })
    .await
    .unwrap_or_else(|e| panic!("start test server: {e}"))
}

fn transport(server: &TestServer, api_key: &str) -> HttpTransport {
    HttpTransport::new(
        server.base_url(),
        api_key,
        Some("app-1"),
        Some(Duration::from_secs(1)),
        Some(Duration::from_secs(5)),
    )
    .unwrap_or_else(|e| panic!("transport: {e}"))
}

#[tokio::test]
async fn pass_is_posted_as_json_with_credentials() {
    let server = intake("secret").await;

    let registry = Arc::new(Registry::default());
    registry
        .counter(name("web", "Hits", "total"))
        .unwrap_or_else(|e| panic!("{e}"))
        .inc_by(42);

    let reporter = DatadogReporter::new(registry, transport(&server, "secret"))
        .with_host(Some("h1".to_string()))
        .with_runtime_stats(Arc::new(RuntimeSnapshot::default()));
    let report = reporter.run().await;
    assert_eq!(report.outcome, PassOutcome::Sent);

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].api_key, "secret");
    assert_eq!(received[0].application_key.as_deref(), Some("app-1"));
    assert_eq!(server.stats().saw_json_content_type(), 1);

    let names = received[0].metric_names();
    assert!(names.contains(&"jvm.memory.heap_usage"));
    assert_eq!(names.last(), Some(&"web.Hits.total"));

    let hits = &received[0].series()[received[0].series().len() - 1];
    assert_eq!(hits["points"][0][1].as_f64(), Some(42.0));
    assert_eq!(hits["type"], "counter");
    assert_eq!(hits["host"], "h1");

    server.shutdown().await;
}

#[tokio::test]
async fn rejected_key_is_a_send_failure() {
    let server = intake("secret").await;

    let reporter = DatadogReporter::new(Arc::new(Registry::default()), transport(&server, "wrong"));
    let report = reporter.run().await;
    assert_eq!(report.outcome, PassOutcome::Failed(PassStage::Sending));
    assert!(server.received().is_empty());
    assert_eq!(server.stats().rejected_total(), 1);

    server.shutdown().await;
}

#[tokio::test]
async fn intake_outage_does_not_stop_later_passes() {
    let server = intake("secret").await;
    let reporter = DatadogReporter::new(Arc::new(Registry::default()), transport(&server, "secret"));

    server.set_status(503);
    assert_eq!(
        reporter.run().await.outcome,
        PassOutcome::Failed(PassStage::Sending)
    );

    server.set_status(202);
    assert!(reporter.run().await.is_sent());
    assert_eq!(server.received().len(), 1);
    assert_eq!(server.stats().requests_total(), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_intake_fails_the_pass() {
    let reporter = DatadogReporter::new(
        Arc::new(Registry::default()),
        HttpTransport::new(
            "http://127.0.0.1:9",
            "k",
            None,
            Some(Duration::from_millis(200)),
            Some(Duration::from_secs(1)),
        )
        .unwrap_or_else(|e| panic!("{e}")),
    );
    assert_eq!(
        reporter.run().await.outcome,
        PassOutcome::Failed(PassStage::Sending)
    );
}

#[tokio::test]
async fn scheduled_reporter_keeps_posting() {
    let server = intake("secret").await;
    let cfg = ReporterConfig {
        api_key: Some("secret".to_string()),
        endpoint: server.base_url().to_string(),
        interval: Duration::from_millis(50),
        ..ReporterConfig::default()
    };
    if let Err(e) = cfg.validate() {
        panic!("{e}");
    }

    let transport = HttpTransport::from_config(&cfg).unwrap_or_else(|e| panic!("{e}"));
    let reporter = Arc::new(DatadogReporter::new(Arc::new(Registry::default()), transport));
    let handle = reporter.start(cfg.interval);

    let received = server.wait_for(3, Duration::from_secs(5)).await;
    handle.shutdown().await;
    assert!(received.len() >= 3, "got {} payloads", received.len());

    server.shutdown().await;
}

#[tokio::test]
async fn instance_id_comes_from_metadata_service() {
    let server = intake("secret").await;
    let client = HttpClient::default();

    let id = ec2_instance_id_from(&client, &server.urls().instance_id)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(id, "i-0abc123");

    server.shutdown().await;
}

#[tokio::test]
async fn missing_instance_id_is_an_error() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("start test server: {e}"));

    let err = match ec2_instance_id_from(&HttpClient::default(), &server.urls().instance_id).await {
        Ok(id) => panic!("unexpected instance id {id}"),
        Err(e) => e,
    };
    assert_eq!(err.kind(), HttpErrorKind::Status);

    server.shutdown().await;
}

#[tokio::test]
async fn client_response_is_status_and_body() {
    let server = intake("secret").await;

    let res = HttpClient::default()
        .get(&server.urls().instance_id)
        .await
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(
        res,
        HttpResponse {
            status: 200,
            body: Bytes::from_static(b"i-0abc123"),
        }
    );

    server.shutdown().await;
}
