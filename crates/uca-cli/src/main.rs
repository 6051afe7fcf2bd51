//! uca - keep installed coding-agent CLIs up to date
//!
//! Usage:
//!   uca                     Update every installed agent
//!   uca --only amp,codex    Update a subset
//!   uca -n --explain        Show what would run and why

mod cli;
mod output;

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uca_core::{default_agents, select_agents, Agent, AgentResult, UcaConfig};
use uca_dashboard::DashboardConfig;
use uca_exec::{CancellationToken, CommandRunner, SystemRunner};
use uca_orchestrator::{event_channel, summarize, Classifier, RunOptions, Summary, UpdateEngine};
use uca_probe::{EnvironmentProbe, ProbeTimeouts, SearchPath};

use crate::cli::Cli;
use crate::output::OutputOptions;

/// Environment variable holding the log filter
const LOG_ENV: &str = "UCA_LOG";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the dashboard
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = UcaConfig::locate(cli.config.as_deref());
    let config = UcaConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    let selection = select_agents(&default_agents(), &cli.only, &cli.skip);
    for name in &selection.unknown {
        warn!("Unknown agent: {}", name);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(cancel.clone()));
    let probe = Arc::new(EnvironmentProbe::detect(
        Arc::clone(&runner),
        Arc::new(SearchPath),
        ProbeTimeouts::from(&config),
    ));
    let engine = UpdateEngine::new(Arc::clone(&probe), runner)
        .with_classifier(Classifier::from_config(&config.classifier));

    let options = RunOptions {
        dry_run: cli.dry_run,
        scheduler: cli.scheduler_options(&config),
    };
    info!(agents = selection.agents.len(), ?options, "Starting run");

    let use_dashboard = !cli.quiet && std::io::stdout().is_terminal();
    let (results, dashboard_shown) = if use_dashboard {
        run_with_dashboard(engine, &selection.agents, &options, cli.explain).await
    } else {
        (engine.run(&selection.agents, &options).await, false)
    };

    let output_options = OutputOptions {
        verbose: cli.verbose,
        explain: cli.explain,
        dry_run: cli.dry_run,
    };
    let summary = summarize(&results, &selection.unknown);
    print_report(&results, &summary, &cli, output_options, dashboard_shown);

    if summary.has_failures() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Run with the live dashboard; the flag reports whether it rendered to the end
async fn run_with_dashboard(
    engine: UpdateEngine,
    agents: &[Agent],
    options: &RunOptions,
    explain: bool,
) -> (Vec<AgentResult>, bool) {
    engine.probe().prewarm(agents);

    let (sink, events) = event_channel();
    let names = agents.iter().map(|agent| agent.name.clone()).collect();
    let config = DashboardConfig::from_env().with_explain(explain);
    let dashboard = tokio::spawn(uca_dashboard::run(events, names, config));

    let engine = engine.with_events(sink);
    let results = engine.run(agents, options).await;
    // Dropping the last sink closes the channel and ends the dashboard
    drop(engine);

    let shown = match dashboard.await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Dashboard failed: {}", e);
            false
        }
        Err(e) => {
            warn!("Dashboard task panicked: {}", e);
            false
        }
    };
    (results, shown)
}

fn print_report(
    results: &[AgentResult],
    summary: &Summary,
    cli: &Cli,
    options: OutputOptions,
    dashboard_shown: bool,
) {
    if dashboard_shown {
        println!();
        if cli.explain {
            for line in output::explain_lines(results) {
                println!("{}", line);
            }
        }
    } else if !cli.quiet {
        for line in output::result_lines(results, options) {
            println!("{}", line);
        }
    }

    let groups = output::log_groups(results, options);
    if !groups.is_empty() {
        println!();
        for line in output::log_lines(&groups) {
            println!("{}", line);
        }
    }

    if !cli.quiet || !groups.is_empty() {
        println!();
    }
    for line in output::summary_lines(summary) {
        println!("{}", line);
    }
}

/// Cancel the run on Ctrl-C (and SIGTERM on unix)
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    debug!("Signal received; canceling run");
    cancel.cancel();
}
