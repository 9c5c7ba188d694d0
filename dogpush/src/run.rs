use anyhow::Context as _;
use std::sync::Arc;

use dogpush_core::{
    DatadogReporter, HostDiscovery, ProcessRuntimeStats, ReporterConfig, Transport,
    WriterTransport,
};
use dogpush_http::{HttpClient, HttpTransport, ec2_instance_id};
use dogpush_metrics::Registry;

use crate::cli::{DumpArgs, ReporterArgs, RunArgs};
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::self_metrics::{InstrumentedTransport, TransportMetrics};

/// Config file, then environment, then flags.
fn load_config<I>(args: &ReporterArgs, env: I) -> Result<ReporterConfig, RunError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut cfg = match &args.config {
        Some(path) => ReporterConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))
            .map_err(RunError::InvalidInput)?,
        None => ReporterConfig::default(),
    };

    cfg.apply_env(env);

    if let Some(host) = &args.host {
        cfg.host = Some(host.clone());
    }
    if let Some(discovery) = args.host_discovery {
        cfg.host_discovery = discovery;
    }
    if args.no_runtime {
        cfg.report_runtime = false;
    }

    Ok(cfg)
}

fn apply_run_flags(cfg: &mut ReporterConfig, args: &RunArgs) {
    if let Some(key) = &args.api_key {
        cfg.api_key = Some(key.clone());
    }
    if let Some(key) = &args.app_key {
        cfg.application_key = Some(key.clone());
    }
    if let Some(endpoint) = &args.endpoint {
        cfg.endpoint = endpoint.clone();
    }
    if let Some(interval) = args.interval {
        cfg.interval = interval;
    }
}

fn validate(cfg: &ReporterConfig) -> Result<(), RunError> {
    cfg.validate()
        .context("invalid configuration")
        .map_err(RunError::InvalidInput)
}

async fn resolve_host(cfg: &ReporterConfig) -> Option<String> {
    if cfg.host.is_none() && cfg.host_discovery == HostDiscovery::Ec2 {
        let client = HttpClient::new(Some(cfg.connect_timeout));
        return match ec2_instance_id(&client).await {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(error = %err, "Could not read EC2 instance id; reporting without a host");
                None
            }
        };
    }
    cfg.local_host()
}

/// Registry holding the agent's own metrics, plus the transport wrapped to feed them.
fn instrumented<T: Transport>(
    transport: T,
) -> Result<(Arc<Registry>, InstrumentedTransport<T>), RunError> {
    let registry = Arc::new(Registry::default());
    let metrics = TransportMetrics::register(&registry)
        .context("failed to register agent metrics")
        .map_err(RunError::RuntimeError)?;
    Ok((registry, InstrumentedTransport::new(transport, metrics)))
}

async fn build_reporter<T: Transport>(
    cfg: &ReporterConfig,
    transport: T,
) -> Result<DatadogReporter<InstrumentedTransport<T>>, RunError> {
    let (registry, transport) = instrumented(transport)?;
    let mut reporter =
        DatadogReporter::new(registry, transport).with_host(resolve_host(cfg).await);

    if cfg.report_runtime {
        let stats = ProcessRuntimeStats::new()
            .context("failed to read process statistics")
            .map_err(RunError::RuntimeError)?;
        reporter = reporter.with_runtime_stats(Arc::new(stats));
    }
    Ok(reporter)
}

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let mut cfg = load_config(&args.reporter, std::env::vars())?;
    apply_run_flags(&mut cfg, &args);
    validate(&cfg)?;

    let http = HttpTransport::from_config(&cfg)
        .context("failed to set up the series transport")
        .map_err(RunError::InvalidInput)?;
    let reporter = build_reporter(&cfg, http).await?;

    tracing::info!(
        endpoint = %cfg.endpoint,
        host = reporter.host().unwrap_or("-"),
        interval = %humantime::format_duration(cfg.interval),
        runtime = cfg.report_runtime,
        "dogpush starting"
    );

    if args.once {
        let report = reporter.run().await;
        return Ok(ExitCode::from_pass(report.is_sent()));
    }

    let handle = Arc::new(reporter).start(cfg.interval);
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
        .map_err(RunError::RuntimeError)?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(ExitCode::Success)
}

pub async fn dump(args: DumpArgs) -> Result<ExitCode, RunError> {
    let cfg = load_config(&args.reporter, std::env::vars())?;
    validate(&cfg)?;

    let reporter = build_reporter(&cfg, WriterTransport::stdout()).await?;
    let report = reporter.run().await;
    Ok(ExitCode::from_pass(report.is_sent()))
}
