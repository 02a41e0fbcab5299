use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use emergency_dispatch::factory::{spawn_city, DispatchConfig, GraphSource};
use emergency_dispatch::{Role, SessionOutcome};

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// City description: map, agents and negotiation timing.
    #[clap(long, env = "CITY_DISPATCH_CONFIG", default_value = "city.yaml")]
    pub config: PathBuf,
    /// Seconds to wait for Requesters before giving up.
    #[clap(long, env = "CITY_DISPATCH_TIMEOUT", default_value = "30")]
    pub timeout: u64,
}

/// Paths in config are relative to config file location.
fn resolve_paths(mut config: DispatchConfig, config_path: &Path) -> DispatchConfig {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));

    if config.output_dir.is_relative() {
        config.output_dir = base.join(&config.output_dir);
    }
    if let GraphSource::File { path } = &mut config.graph {
        if path.is_relative() {
            *path = base.join(&*path);
        }
    }
    config
}

async fn wait_for_requesters(
    city: &mut emergency_dispatch::factory::City,
    timeout: Duration,
) -> Vec<(String, SessionOutcome)> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut outcomes = vec![];

    for (addr, callbacks) in &mut city.agents {
        if addr.identity.role != Role::Requester {
            continue;
        }

        match tokio::time::timeout_at(deadline, callbacks.outcome_channel.recv()).await {
            Ok(Some(outcome)) => outcomes.push((addr.identity.name.clone(), outcome)),
            Ok(None) => log::warn!("[{}] Stopped without result.", addr.identity.name),
            Err(_) => log::warn!("[{}] Didn't finish in {:?}.", addr.identity.name, timeout),
        }
    }
    outcomes
}

#[actix_rt::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = DispatchConfig::load(&args.config)?;
    let config = resolve_paths(config, &args.config);

    let mut city = spawn_city(&config).context("Starting city agents")?;
    log::info!(
        "Started {} agent(s). Trips will be saved in {}.",
        city.agents.len(),
        config.output_dir.display()
    );

    let outcomes = tokio::select! {
        outcomes = wait_for_requesters(&mut city, Duration::from_secs(args.timeout)) => outcomes,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted.");
            vec![]
        }
    };

    for (name, outcome) in &outcomes {
        match outcome {
            SessionOutcome::Committed {
                winner, distance, ..
            } => log::info!(
                "[{}] Dispatched to [{}] at node {} (distance: {}).",
                name,
                winner.provider.name,
                winner.position,
                distance
            ),
            SessionOutcome::Failed { reason, .. } => log::warn!("[{}] {}.", name, reason),
        }
    }

    for (addr, _) in &city.agents {
        addr.shutdown().await.ok();
    }
    Ok(())
}
