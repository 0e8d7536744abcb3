//! Command line access to identity derivation and schedule prediction.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use parachain_xcm_harness::{
    chain::{self, ChainHandle, RpcChain},
    config::{SchedulerConfig, MAX_BLOCK_REF_TIME},
    identity, BlockOptions, ExecutionOutcome, HarnessConfig, SchedulerSimulator,
};
use sp_core::H160;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Relation {
    Sibling,
    Child,
    Parent,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sovereign account of another chain.
    Sovereign {
        #[arg(long, value_enum, default_value_t = Relation::Sibling)]
        relation: Relation,
        #[arg(long, default_value_t = 0)]
        para_id: u32,
    },
    /// Account a `DescendOrigin` into `address` resolves to.
    DescendOrigin {
        address: String,
        #[arg(long, default_value_t = identity::LEGACY_DESCEND_PARA_ID)]
        para_id: u32,
        /// Use the `("multiloc", location)` hashing of older runtimes.
        #[arg(long)]
        legacy: bool,
    },
    /// Predicts how `count` messages of `weight` are serviced.
    Schedule {
        #[arg(long)]
        count: usize,
        #[arg(long)]
        weight: u64,
        /// Hex seed; read from the node's parent hash when omitted.
        #[arg(long)]
        seed: Option<String>,
        /// Take threshold and decay from the node's queue configuration.
        #[arg(long)]
        from_node: bool,
    },
    /// Produces blocks on the node, finalized as configured.
    Seal {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON harness configuration.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Overrides the configured node endpoint.
    #[arg(long)]
    node_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

fn parse_address(address: &str) -> anyhow::Result<H160> {
    let bytes = hex::decode(address.trim_start_matches("0x")).context("address is not hex")?;
    if bytes.len() != 20 {
        return Err(anyhow!("address must be 20 bytes, got {}", bytes.len()));
    }
    Ok(H160::from_slice(&bytes))
}

async fn connect(config: &HarnessConfig) -> anyhow::Result<RpcChain> {
    RpcChain::from_config(config).await.with_context(|| format!("connecting to {}", config.node_url))
}

async fn seal(config: HarnessConfig, count: usize) -> anyhow::Result<()> {
    let node = connect(&config).await?;
    for _ in 0..count {
        let block = node.produce_block(BlockOptions::from_config(&config)).await?;
        println!("{:?}", block.hash);
    }
    Ok(())
}

async fn schedule(
    config: HarnessConfig,
    count: usize,
    weight: u64,
    seed: Option<String>,
    from_node: bool,
) -> anyhow::Result<()> {
    let node = if from_node || seed.is_none() {
        Some(connect(&config).await?)
    } else {
        None
    };

    let mut scheduler = config.scheduler.clone();
    if let (true, Some(node)) = (from_node, &node) {
        let queue = chain::queue_config(node).await?;
        scheduler = SchedulerConfig::from_queue_config(MAX_BLOCK_REF_TIME, &queue)
            .with_initialization_cap(scheduler.max_messages_on_initialization);
    }
    let seed = match seed {
        Some(seed) => hex::decode(seed.trim_start_matches("0x")).context("seed is not hex")?,
        None => node.as_ref().context("no node to read the seed from")?.parent_hash().await?.as_bytes().to_vec(),
    };

    let schedule = SchedulerSimulator::new(scheduler).simulate_uniform(&seed, count, weight);
    for (index, message) in schedule.messages.iter().enumerate() {
        println!("{index}\t{}\t{:?}", message.position, message.outcome);
    }
    println!(
        "on_initialization={} rejected={} on_idle={} weight_used={}",
        schedule.count(ExecutionOutcome::ExecutedOnInitialization),
        schedule.count(ExecutionOutcome::RejectedByBarrier),
        schedule.count(ExecutionOutcome::ExecutedOnIdle),
        schedule.weight_used,
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(url) = cli.node_url {
        config.node_url = url;
    }

    match cli.command {
        Command::Sovereign { relation, para_id } => {
            let account = match relation {
                Relation::Sibling => identity::sovereign_account_of_sibling(para_id),
                Relation::Child => identity::sovereign_account_of_child(para_id),
                Relation::Parent => identity::sovereign_account_of_parent(),
            };
            println!("{account:?}");
        }
        Command::DescendOrigin { address, para_id, legacy } => {
            let origin = parse_address(&address)?;
            let account = if legacy {
                identity::descend_origin_from_address(origin)
            } else {
                identity::descend_origin_from_address20(para_id, origin)
            };
            println!("{account:?}");
        }
        Command::Schedule { count, weight, seed, from_node } => {
            schedule(config, count, weight, seed, from_node).await?;
        }
        Command::Seal { count } => seal(config, count).await?,
    }
    Ok(())
}
