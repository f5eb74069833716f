//! HiveSync scenario harness
//!
//! Runs the core end to end against the in-process overlay and checks the
//! observed outcomes:
//!   - chain: chained puts, descending range read, full digest, range remove
//!   - rollback: a failing second step compensates the first
//!   - fork: a fork group with one failing member leaves nothing behind
//!
//!   cargo run -p hivesync-harness -- --peers 16 --replication 3 --versions 5

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use hivesync_core::core_data::{DataManager, ProtectionKeyManager, ProtectionKeys, VersionedEntry};
use hivesync_core::core_dht::{ContentAddress, LocalDht, Order, Target, VersionRange};
use hivesync_core::core_process::{
    DigestExpectation, ExecutionEnv, ProcessBuilder, ProcessStatus, ProcessStep,
};
use hivesync_core::logging::{init_logging_with_config, LogHandle, LogLevel};
use hivesync_core::Config;

#[derive(Parser, Debug)]
#[command(name = "hivesync-harness")]
#[command(about = "Runs HiveSync core scenarios against an in-process overlay", long_about = None)]
struct Args {
    /// Peers in the overlay
    #[arg(long)]
    peers: Option<usize>,

    /// Replicas per location
    #[arg(long)]
    replication: Option<usize>,

    /// Revisions written by the chain scenario
    #[arg(long, default_value = "3")]
    versions: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Environment configuration with the command line applied on top
    fn config(&self) -> Result<Config> {
        let mut config = Config::from_env().context("reading environment configuration")?;
        if let Some(peers) = self.peers {
            config.dht.peer_count = peers;
        }
        if let Some(replication) = self.replication {
            config.dht.replication_factor = replication;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json {
            config.logging.json_format = true;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

struct Harness {
    data: DataManager,
    keys: Arc<ProtectionKeyManager>,
    log: LogHandle,
}

impl Harness {
    fn new(config: &Config) -> Self {
        let log = LogHandle::new("harness");
        let dht = LocalDht::new(config.dht.clone(), log.child("dht"));
        let data = DataManager::new(Arc::new(dht), config.data.clone(), log.child("data"));
        Harness { data, keys: Arc::new(ProtectionKeyManager::new()), log }
    }

    fn env(&self) -> ExecutionEnv {
        ExecutionEnv::new(self.data.clone(), self.keys.clone(), self.log.child("process"))
    }

    async fn count(&self, address: ContentAddress) -> Result<usize> {
        Ok(self.data.digest(Target::all(address)).await?.len())
    }
}

async fn chain_scenario(harness: &Harness, versions: usize) -> Result<()> {
    ensure!(versions > 0, "--versions must be at least 1");
    let address = ContentAddress::hashed("location", "content");
    let keys = ProtectionKeys::unprotected();

    let mut previous: Option<VersionedEntry> = None;
    let mut written = Vec::with_capacity(versions);
    for i in 1..=versions {
        let content = format!("v{}", i).into_bytes();
        let mut entry = match &previous {
            Some(prev) => prev.successor(content),
            None => VersionedEntry::new(content),
        };
        written.push(harness.data.put(address, &mut entry, &keys).await?);
        previous = Some(entry);
    }

    let latest = harness
        .data
        .get_range(address, VersionRange::full(), Order::Descending, Some(1))
        .await?;
    let expected = format!("v{}", versions).into_bytes();
    match latest.first() {
        Some(stored) if stored.entry.content == expected => {}
        Some(stored) => bail!(
            "latest revision is {:?}, expected {:?}",
            String::from_utf8_lossy(&stored.entry.content),
            String::from_utf8_lossy(&expected)
        ),
        None => bail!("descending range read returned nothing"),
    }

    let digest = harness.data.digest(Target::all(address)).await?;
    ensure!(
        digest.len() == versions && written.iter().all(|k| digest.contains(k)),
        "digest holds {} keys, expected the {} written",
        digest.len(),
        versions
    );

    ensure!(harness.data.remove(Target::all(address), &keys).await, "range remove failed");
    ensure!(harness.count(address).await? == 0, "entries survived the range remove");

    println!("chain:    {} revisions, latest wins, digest complete, range remove clean", versions);
    Ok(())
}

async fn rollback_scenario(harness: &Harness) -> Result<()> {
    let address = ContentAddress::hashed("location", "rollback");
    let mut process = ProcessBuilder::new("rollback")
        .step(ProcessStep::put(
            "put",
            address,
            VersionedEntry::new(b"compensated".to_vec()),
            ProtectionKeys::unprotected(),
        ))
        .step(ProcessStep::digest("fail", Target::all(address), DigestExpectation::Empty))
        .build(harness.env());

    let report = process.run().await?;
    ensure!(report.status == ProcessStatus::Failed, "process ended {}", report.status);
    ensure!(harness.count(address).await? == 0, "the put was not compensated");

    println!("rollback: status {}, put compensated", report.status);
    Ok(())
}

async fn fork_scenario(harness: &Harness) -> Result<()> {
    let names = ["fork-a", "fork-b", "fork-c"];
    let addresses: Vec<ContentAddress> =
        names.iter().map(|name| ContentAddress::hashed("location", name)).collect();

    let mut members: Vec<ProcessStep> = names
        .iter()
        .zip(&addresses)
        .take(2)
        .map(|(name, address)| {
            ProcessStep::put(
                *name,
                *address,
                VersionedEntry::new(name.as_bytes().to_vec()),
                ProtectionKeys::unprotected(),
            )
        })
        .collect();
    members.push(ProcessStep::digest(
        names[2],
        Target::all(addresses[2]),
        DigestExpectation::NonEmpty,
    ));

    let mut process = ProcessBuilder::new("fork").fork("members", members).build(harness.env());
    let report = process.run().await?;
    ensure!(report.status == ProcessStatus::Failed, "process ended {}", report.status);
    for address in &addresses {
        ensure!(harness.count(*address).await? == 0, "fork member {} survived", address);
    }

    println!("fork:     status {}, all members rolled back", report.status);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.config()?;
    init_logging_with_config(config.logging.to_log_config()?)?;

    let level: LogLevel = config.logging.level.parse().unwrap_or_default();
    info!(
        peers = config.dht.peer_count,
        replication = config.dht.replication_factor,
        level = %level,
        "Starting harness"
    );

    let harness = Harness::new(&config);
    chain_scenario(&harness, args.versions).await?;
    rollback_scenario(&harness).await?;
    fork_scenario(&harness).await?;

    println!("all scenarios passed");
    Ok(())
}
