//! Run a tournament between two agents.
//!
//! Usage: cargo run --release --bin arena -- <agentA> <agentB> <matchCount> [--json <path>]
//!
//! Example:
//!   cargo run --release --bin arena -- openai/gpt-5-mini anthropic/claude-haiku-4.5 10 --json results.json

use std::env;
use std::sync::Arc;

use arena::clients::openrouter::OpenRouterAgent;
use arena::{ArenaConfig, CancelHandle, EvalSummary, MatchOrchestrator, TournamentRunner};
use arena_core::{AgentStats, ShakmatyBoard};
use evaluation::EvaluationCache;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct CliArgs {
    agent_a: String,
    agent_b: String,
    match_count: u32,
    json_path: Option<String>,
}

fn parse_args() -> Option<CliArgs> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        return None;
    }

    let match_count = args[3].parse().ok()?;
    let mut json_path = None;

    let mut i = 4;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => {
                json_path = args.get(i + 1).cloned();
                i += 2;
            }
            _ => i += 1,
        }
    }

    Some(CliArgs {
        agent_a: args[1].clone(),
        agent_b: args[2].clone(),
        match_count,
        json_path,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let Some(cli) = parse_args() else {
        eprintln!("Usage: arena <agentA> <agentB> <matchCount> [--json <path>]");
        std::process::exit(1);
    };

    let config = ArenaConfig::from_env()?;

    let evaluator = evaluation::evaluator_from_config(&config.evaluation).await?;
    let cache = EvaluationCache::start(evaluator, config.evaluation.cache.clone());
    let agent = Arc::new(OpenRouterAgent::new(&config)?);

    let orchestrator = MatchOrchestrator::new(
        Box::new(ShakmatyBoard::new()),
        agent,
        Some(cache.clone()),
        config.match_config.clone(),
    );
    let mut runner = TournamentRunner::new(orchestrator);
    let mut events = runner.subscribe();

    let (cancel_handle, cancel) = CancelHandle::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current turn");
            cancel_handle.cancel();
        }
    });

    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let result = &event.result;
            info!(
                "Match {}/{}: {} (White) vs {} (Black) -> {:?}, {} in {} half-moves",
                event.index + 1,
                event.total,
                result.white_agent,
                result.black_agent,
                result.outcome,
                result.end_reason_text(),
                result.half_moves,
            );
        }
    });

    let summary = runner
        .evaluate(&cli.agent_a, &cli.agent_b, cli.match_count, &cancel)
        .await;
    // Closes the event channel so the reporter drains and exits.
    drop(runner);
    let _ = reporter.await;
    let summary = summary?;

    print_summary(&summary);

    if let Some(path) = &cli.json_path {
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        info!(path = %path, "Summary written");
    }

    let stats = cache.stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        external_calls = stats.external_calls,
        "Evaluation cache"
    );
    cache.shutdown().await;

    Ok(())
}

fn print_summary(summary: &EvalSummary) {
    println!();
    println!(
        "{:<40} {:>5} {:>8} {:>6} {:>6} {:>8} {:>6}",
        "Agent", "Wins", "OnPoints", "Losses", "Draws", "Failures", "Score"
    );
    for stats in [&summary.agent_a, &summary.agent_b] {
        print_row(stats);
    }
    println!();
    println!(
        "{} matches played{}",
        summary.results.len(),
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}

fn print_row(stats: &AgentStats) {
    println!(
        "{:<40} {:>5} {:>8} {:>6} {:>6} {:>8} {:>6.1}",
        stats.agent,
        stats.wins,
        stats.wins_on_points,
        stats.losses,
        stats.draws,
        stats.failures,
        stats.score()
    );
}
