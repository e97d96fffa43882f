use anyhow::Context;
use chrono::Utc;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use scenario_engine::{EngineConfig, ForkSpec, Orchestrator, PoolRun, ReportFormat, Reporter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod suites;

fn cli() -> Command {
    Command::new("scenarios")
        .version(scenario_engine::VERSION)
        .about("Run constraint-driven scenarios against one or more bases")
        .arg(
            Arg::new("bases")
                .long("bases")
                .value_delimiter(',')
                .help("Comma-separated base names to run against (default: all configured)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_parser(value_parser!(usize))
                .help("Worker pool size"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_parser(value_parser!(ReportFormat))
                .help("Report format: console or json"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .help("Write the report to this file instead of stdout"),
        )
        .arg(
            Arg::new("fork-source")
                .long("fork-source")
                .help("Upstream RPC URL that node bases are reset to fork from"),
        )
        .arg(
            Arg::new("spider")
                .long("spider")
                .action(ArgAction::SetTrue)
                .help("Signal that an external crawler maps existing deployments before the run; the engine only forwards this flag"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Log at debug level"),
        )
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file, then apply command line overrides
fn resolve_config(matches: &ArgMatches) -> anyhow::Result<EngineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(&workers) = matches.get_one::<usize>("workers") {
        config = config.with_workers(workers);
    }
    if let Some(&format) = matches.get_one::<ReportFormat>("format") {
        config.report.format = format;
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config.report.output = Some(output.clone());
    }
    Ok(config)
}

fn selected_bases(matches: &ArgMatches, config: &EngineConfig) -> anyhow::Result<Vec<ForkSpec>> {
    let names: Vec<String> = matches
        .get_many::<String>("bases")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    Ok(config.select_bases(&names)?)
}

async fn run(matches: &ArgMatches) -> anyhow::Result<i32> {
    let config = resolve_config(matches)?;
    let bases = selected_bases(matches, &config)?;
    let spider = matches.get_flag("spider");
    let fork_source = matches.get_one::<String>("fork-source").map(String::as_str);

    tracing::info!(
        bases = ?bases.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
        workers = config.workers,
        "starting run"
    );

    let ledger = Orchestrator::new(suites::sim::loader(), Arc::new(suites::sim::factory()))
        .with_workers(config.workers)
        .with_spider(spider);
    let node = Orchestrator::new(suites::rpc::loader(), Arc::new(suites::rpc::factory(fork_source)))
        .with_workers(config.workers)
        .with_spider(spider);

    let start = Utc::now();
    let mut outcome = PoolRun::default();
    for base in &bases {
        let batch = if base.url.is_some() {
            node.run_base(base).await
        } else {
            ledger.run_base(base).await
        };
        outcome.merge(batch.with_context(|| format!("base `{}` failed", base.name))?);
    }
    let end = Utc::now();

    Reporter::new(&config.report)
        .report(&outcome.results, start, end)
        .context("writing report")?;

    for orphan in &outcome.orphaned {
        tracing::error!(base = %orphan.base, scenario = %orphan.scenario, "scenario produced no result");
    }

    Ok(outcome.exit_code())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    match run(&matches).await {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            tracing::error!("{error:#}");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn spider_help_names_external_crawler() {
        let help = cli().render_long_help().to_string();
        assert!(help.contains("external crawler"));
        assert!(help.contains("only forwards"));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.toml");
        std::fs::write(
            &path,
            r#"
workers = 3

[[bases]]
name = "development"

[[bases]]
name = "mainnet-fork"
url = "http://127.0.0.1:{worker}8545"
block_number = 19000000
"#,
        )
        .unwrap();

        let matches = cli()
            .try_get_matches_from([
                "scenarios",
                "--config",
                path.to_str().unwrap(),
                "--workers",
                "5",
                "--format",
                "json",
                "--bases",
                "mainnet-fork",
            ])
            .unwrap();

        let config = resolve_config(&matches).unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.report.format, ReportFormat::Json);

        let bases = selected_bases(&matches, &config).unwrap();
        assert_eq!(bases.len(), 1);
        assert_eq!(bases[0].url_for(1).as_deref(), Some("http://127.0.0.1:18545"));
    }

    #[test]
    fn unknown_base_is_rejected() {
        let matches = cli()
            .try_get_matches_from(["scenarios", "--bases", "nowhere"])
            .unwrap();
        let config = EngineConfig::default();
        assert!(selected_bases(&matches, &config).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn default_run_passes_and_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");
        let matches = cli()
            .try_get_matches_from([
                "scenarios",
                "--workers",
                "2",
                "--format",
                "json",
                "--output",
                output.to_str().unwrap(),
            ])
            .unwrap();

        assert_eq!(run(&matches).await.unwrap(), 0);
        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(report["stats"]["failures"], 0);
        assert_eq!(report["stats"]["tests"], 4);
    }
}
