//! Re-aggregation Binary - rebuild stored episodes from raw sound events
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin reaggregate -- --session <SESSION_ID>
//! cargo run --release --bin reaggregate -- --all
//! ```
//!
//! ## Environment Variables
//!
//! - SNOREFLOW_DB_PATH - SQLite database path (default: data/snoreflow.db)
//! - EPISODE_GAP_THRESHOLD_SECS - Gap threshold in seconds (default: 3.0)
//! - RELEVANT_LABELS - Comma-separated relevant labels
//! - PRIMARY_LABEL - Label counted as primary (default: snoring)
//! - RUST_LOG - Logging level (optional, default: info)

use snoreflow::config::EngineConfig;
use snoreflow::episode_core::{BatchSegmenter, SqliteEpisodeStore};
use std::env;
use std::sync::Arc;

enum Target {
    Session(String),
    All,
}

fn parse_target_from_args() -> Option<Target> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--all") {
        return Some(Target::All);
    }
    let idx = args.iter().position(|a| a == "--session")?;
    args.get(idx + 1).map(|id| Target::Session(id.clone()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let Some(target) = parse_target_from_args() else {
        eprintln!("usage: reaggregate --session <SESSION_ID> | --all");
        std::process::exit(2);
    };

    let config = EngineConfig::from_env()?;

    log::info!("🚀 Starting re-aggregation");
    log::info!("📊 Configuration:");
    log::info!("   SNOREFLOW_DB_PATH: {}", config.db_path);
    log::info!("   Gap threshold: {}s", config.gap_threshold_secs);
    log::info!("   Relevant labels: {:?}", config.relevant_labels);
    log::info!("   Primary label: {}", config.primary_label);

    let store = Arc::new(SqliteEpisodeStore::open(&config.db_path)?);
    let segmenter = BatchSegmenter::new(config.relevance_policy(), store.clone());

    let sessions = match target {
        Target::Session(id) => vec![id],
        Target::All => store.list_sessions()?,
    };

    let mut failed_sessions = 0;
    for session_id in &sessions {
        match segmenter.run(session_id).await {
            Ok(report) => {
                println!(
                    "{}\tevents={}\tskipped={}\tepisodes={}\tsave_failures={}",
                    session_id,
                    report.events_read,
                    report.events_skipped,
                    report.episodes_written(),
                    report.failures.len()
                );
            }
            Err(e) => {
                failed_sessions += 1;
                log::error!("❌ {}", e);
            }
        }
    }

    log::info!(
        "✅ Re-aggregated {} sessions ({} failed)",
        sessions.len() - failed_sessions,
        failed_sessions
    );

    if failed_sessions > 0 {
        std::process::exit(1);
    }
    Ok(())
}
