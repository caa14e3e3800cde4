use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strata_node::chain::accept::BlockEngine;
use strata_node::chain::Chain;
use strata_node::config::ConsensusConfig;
use strata_node::consensus_poc::reward::block_subsidy;
use strata_node::fork::ForkSchedule;
use strata_node::genesis;
use strata_node::listener::BlockEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // init tracing from env STRATA_LOG or RUST_LOG
    let filter = std::env::var("STRATA_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = ConsensusConfig::from_env();
    let forks = ForkSchedule::default();

    let data_dir = std::env::var("STRATA_DATA_DIR").unwrap_or_else(|_| "./strata-data".into());
    let db = sled::open(&data_dir).with_context(|| format!("failed to open {data_dir}"))?;

    let chain = Chain::bootstrap(db.clone(), &config, &forks).context("chain bootstrap failed")?;
    genesis::verify_genesis(
        chain.block_at(0).expect("bootstrap guarantees genesis"),
        &config,
        &forks,
    )?;
    info!(
        height = chain.height(),
        tip = format_args!("{:#018x}", chain.tip().id()),
        data_dir = %data_dir,
        "strata node starting up"
    );

    let chain = Arc::new(RwLock::new(chain));
    let engine = Arc::new(BlockEngine::new(Arc::clone(&chain), config.clone(), forks));
    engine.listeners().on(BlockEvent::BlockPushed, |block| {
        info!(
            height = block.height,
            block_id = format_args!("{:#018x}", block.id()),
            "new chain head"
        );
    });

    // background: periodic tip status
    {
        let chain = Arc::clone(&chain);
        let config = config.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                let (height, tip_id, base_target, cumulative_difficulty) = {
                    let g = chain.read();
                    let tip = g.tip();
                    (tip.height, tip.id(), tip.base_target, tip.cumulative_difficulty)
                };
                info!(
                    height,
                    tip = format_args!("{:#018x}", tip_id),
                    base_target,
                    cumulative_difficulty = %cumulative_difficulty,
                    next_subsidy_planck = block_subsidy(height + 1, &config),
                    "chain status"
                );
            }
        });
    }

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, flushing chain store");
    db.flush_async().await.context("final flush failed")?;
    Ok(())
}
