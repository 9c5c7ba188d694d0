use clap::{Args, Parser, Subcommand};
use dogpush_core::HostDiscovery;
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }
    humantime::parse_duration(s)
        .map_err(|e| format!("invalid duration '{s}': {e} (expected e.g. 10s, 250ms, 1m)"))
}

fn parse_host_discovery(input: &str) -> Result<HostDiscovery, String> {
    input
        .trim()
        .parse()
        .map_err(|_| format!("unknown host discovery '{input}' (expected none, hostname or ec2)"))
}

#[derive(Debug, Parser)]
#[command(
    name = "dogpush",
    author,
    version,
    about = "Push process metrics to a Datadog series intake",
    long_about = "dogpush reports the metrics of a registry to a Datadog-compatible series intake on a fixed interval.\n\nSettings come from an optional YAML config file, then the DD_API_KEY, DD_APP_KEY and DD_HOST environment variables, then command-line flags; later sources win.\n\nSet RUST_LOG to change log verbosity (default: info).",
    after_help = "Examples:\n  dogpush run --api-key $KEY\n  dogpush run --config dogpush.yaml --interval 15s\n  dogpush run --once --endpoint http://127.0.0.1:8126 --host web-1\n  dogpush dump"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report metrics to the configured intake until interrupted
    Run(RunArgs),

    /// Print one series payload to stdout instead of sending it
    Dump(DumpArgs),
}

/// Overrides applied on top of the config file and environment.
#[derive(Debug, Clone, Default, Args)]
pub struct ReporterArgs {
    /// YAML config file
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Host label attached to every point
    #[arg(long)]
    pub host: Option<String>,

    /// How to find the host label when --host is not given (none, hostname, ec2)
    #[arg(long, value_name = "MODE", value_parser = parse_host_discovery)]
    pub host_discovery: Option<HostDiscovery>,

    /// Skip the process runtime metrics
    #[arg(long)]
    pub no_runtime: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub reporter: ReporterArgs,

    /// Datadog API key
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Datadog application key
    #[arg(long, value_name = "KEY")]
    pub app_key: Option<String>,

    /// Intake base URL (e.g. https://app.datadoghq.com)
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Reporting interval (e.g. 10s, 1m)
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Run a single pass and exit; the exit code reflects whether it was sent
    #[arg(long)]
    pub once: bool,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub reporter: ReporterArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_accepts_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(2 * 60 * 60)));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn cli_parses_run_flags() {
        let parsed = Cli::try_parse_from([
            "dogpush",
            "run",
            "--config",
            "dd.yaml",
            "--api-key",
            "k",
            "--endpoint",
            "http://127.0.0.1:9000",
            "--interval",
            "15s",
            "--host-discovery",
            "ec2",
            "--no-runtime",
            "--once",
        ]);

        let cli = match parsed {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.reporter.config, Some(PathBuf::from("dd.yaml")));
                assert_eq!(args.api_key.as_deref(), Some("k"));
                assert_eq!(args.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
                assert_eq!(args.interval, Some(Duration::from_secs(15)));
                assert_eq!(args.reporter.host_discovery, Some(HostDiscovery::Ec2));
                assert!(args.reporter.no_runtime);
                assert!(args.once);
            }
            Command::Dump(_) => panic!("expected run command"),
        }
    }

    #[test]
    fn cli_parses_dump_defaults() {
        let cli = match Cli::try_parse_from(["dogpush", "dump"]) {
            Ok(v) => v,
            Err(err) => panic!("failed to parse args: {err}"),
        };

        match cli.command {
            Command::Dump(args) => {
                assert_eq!(args.reporter.config, None);
                assert_eq!(args.reporter.host, None);
                assert!(!args.reporter.no_runtime);
            }
            Command::Run(_) => panic!("expected dump command"),
        }
    }

    #[test]
    fn cli_rejects_unknown_host_discovery() {
        assert!(Cli::try_parse_from(["dogpush", "dump", "--host-discovery", "dns"]).is_err());
    }
}
