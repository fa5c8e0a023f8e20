use std::path::PathBuf;

use anyhow::Context;

use clap::Parser;

use serde::Deserialize;
use std::fs::File;

use tracing_subscriber::prelude::*;
use utxo_transfer_engine::amount::Amount;
use utxo_transfer_engine::codec::P2pkhCodec;
use utxo_transfer_engine::config::CoreConfig;
use utxo_transfer_engine::engine::TxEngine;
use utxo_transfer_engine::fee::FixedRateOracle;
use utxo_transfer_engine::memory::{seed_ledger, SeedKey};
use utxo_transfer_engine::provider::LedgerServices;
use utxo_transfer_engine::sweep::{CancelFlag, SweepParams};

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file
    #[clap(long, value_parser)]
    config_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SweepConfig {
    core: CoreConfig,
    fee_rate: Amount,
    wallet: Vec<SeedKey>,
    sweep: SweepParams,
}

#[tokio::main]
async fn main() {
    let result = _main().await;
    result.unwrap();
}

async fn _main() -> anyhow::Result<()> {
    // Start logging setup block
    let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();

    tracing_subscriber::registry().with(fmt_layer).init();

    let Cli { config_path } = Cli::parse();

    tracing::info!("Config file {:?}", config_path);
    let file = File::open(&config_path).with_context(|| {
        format!(
            "Cannot read config file {path}",
            path = config_path.display()
        )
    })?;
    let config: SweepConfig = serde_yaml::from_reader(file).with_context(|| {
        format!(
            "Cannot read config file {path}",
            path = config_path.display()
        )
    })?;
    config.core.validate()?;

    let (ledger, keys) = seed_ledger(&config.wallet, &config.core)?;
    let fees = FixedRateOracle::new(config.fee_rate, &config.core);
    let codec = P2pkhCodec::new();
    let engine = TxEngine::new(
        &config.core,
        &codec,
        LedgerServices {
            utxos: &ledger,
            fees: &fees,
            overlay: &ledger,
            address_book: &ledger,
        },
    );

    let cancel = CancelFlag::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let units = engine.sweep_account(&config.sweep, &cancel)?;
    tracing::info!("{} sweep transactions", units.len());

    let mut results = vec![];
    for unit in units.into_iter() {
        let result = match unit.outcome {
            Ok(mut work) => {
                engine.sign(&mut work, &keys)?;
                let report = engine.verify(&mut work)?;
                serde_json::json!({
                    "source_addresses": unit.source_addresses,
                    "verified": report.passed,
                    "work": work,
                })
            }
            Err(err) => {
                tracing::warn!("{:?} can't be swept: {}", unit.source_addresses, err);
                serde_json::json!({
                    "source_addresses": unit.source_addresses,
                    "error": err.to_string(),
                })
            }
        };
        results.push(result);
    }
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
