//! # Arena Demo
//!
//! Runs a handful of battles on the reference engine and prints every
//! result and replay the orchestrator delivers.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=arena_orchestrator=debug arena_demo --battles 3 --tick-ms 100
//! arena_demo --config arena.toml
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use arena_engine::ReferenceEngine;
use arena_orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult};
use arena_protocol::{output, Context, SessionEnv, UserOp};
use tracing_subscriber::EnvFilter;

struct DemoArgs {
    battles: u32,
    tick_ms: Option<u64>,
    config_path: Option<String>,
}

fn parse_args() -> Option<DemoArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = DemoArgs {
        battles: 2,
        tick_ms: None,
        config_path: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--battles" | "-b" => {
                if let Some(value) = args.get(i + 1) {
                    parsed.battles = value.parse().unwrap_or(2);
                    i += 1;
                }
            }
            "--tick-ms" | "-t" => {
                if let Some(value) = args.get(i + 1) {
                    parsed.tick_ms = value.parse().ok();
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if let Some(value) = args.get(i + 1) {
                    parsed.config_path = Some(value.clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: arena_demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --battles <NUM>     Battles to run (default: 2)");
                println!("  -t, --tick-ms <MS>      Engine tick interval (default: from config)");
                println!("  -c, --config <PATH>     TOML configuration file");
                println!("  -h, --help              Show this help");
                return None;
            }
            _ => {}
        }
        i += 1;
    }
    Some(parsed)
}

fn load_config(args: &DemoArgs) -> OrchestratorResult<OrchestratorConfig> {
    let mut config = match &args.config_path {
        Some(path) => {
            let source = std::fs::read_to_string(path).map_err(|e| {
                arena_orchestrator::OrchestratorError::InvalidConfig(format!("{path}: {e}"))
            })?;
            OrchestratorConfig::from_toml_str(&source)?
        }
        None => OrchestratorConfig {
            tick_interval_ms: 100,
            ..OrchestratorConfig::default()
        },
    };
    if let Some(tick_ms) = args.tick_ms {
        config.tick_interval_ms = tick_ms;
    }
    Ok(config)
}

fn describe(envelope: &Context) -> String {
    match envelope.as_output().and_then(|o| o.event.as_ref()) {
        Some(output::Event::Result(result)) => format!(
            "RESULT  session={} winner={} loser={} score={} duration={}ms",
            envelope.session_id, result.winner, result.loser, result.score, result.duration_ms
        ),
        Some(output::Event::Replay(replay)) => format!(
            "REPLAY  session={} events={} version={}",
            envelope.session_id,
            replay.events.len(),
            replay.version
        ),
        None => format!("UNKNOWN session={}", envelope.session_id),
    }
}

fn run(args: &DemoArgs) -> OrchestratorResult<()> {
    let config = load_config(args)?;
    let engine = Arc::new(ReferenceEngine::new());
    let orchestrator = Orchestrator::builder()
        .with_config(config)
        .with_engine(engine)
        .build()?;
    orchestrator.start()?;

    let creates = orchestrator.create_sender();
    let mut sessions = Vec::new();
    for battle in 0..args.battles {
        let atk = 100 + battle * 2;
        let id = creates.create(0, SessionEnv::new(0, atk, atk + 1))?;
        orchestrator.input(
            id,
            &UserOp {
                team_id: atk,
                action: 1,
                value: 10,
            }
            .into(),
        )?;
        sessions.push(id);
    }
    println!("Started {} battles: {sessions:?}", sessions.len());
    println!();

    // A result and a replay per battle.
    let expected = sessions.len() * 2;
    let outputs = orchestrator.outputs();
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut received = 0;
    while received < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match outputs.recv_timeout(remaining) {
            Ok(envelope) => {
                println!("{}", describe(&envelope));
                received += 1;
            }
            Err(_) => {
                tracing::warn!(received, expected, "timed out waiting for battle outputs");
                break;
            }
        }
    }

    let stats = orchestrator.stats();
    orchestrator.stop();

    println!();
    println!("┌─ STATS ──────────────────────────────────────────────────────────┐");
    println!("│ Ticks:              {}", stats.ticks);
    println!("│ Sessions advanced:  {}", stats.sessions_advanced);
    println!("│ Outputs forwarded:  {}", stats.outputs_forwarded);
    println!("│ Bus drops:          {}", stats.bus.dropped());
    println!("└──────────────────────────────────────────────────────────────────┘");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         ARENA BATTLE ORCHESTRATOR DEMO                           ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let Some(args) = parse_args() else {
        return;
    };
    if let Err(e) = run(&args) {
        tracing::error!(error = %e, "demo failed");
        std::process::exit(1);
    }
}
