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
use utxo_transfer_engine::model::TransferRequest;
use utxo_transfer_engine::provider::LedgerServices;

#[derive(Parser, Debug)]
#[clap(version)]
pub struct Cli {
    /// path to config file
    #[clap(long, value_parser)]
    config_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransferConfig {
    core: CoreConfig,
    /// base units per 1000 bytes
    fee_rate: Amount,
    wallet: Vec<SeedKey>,
    request: TransferRequest,
    #[serde(default)]
    submit: bool,
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
    let config: TransferConfig = serde_yaml::from_reader(file).with_context(|| {
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

    let mut work = engine.build_transfer(&config.request)?;
    engine.sign(&mut work, &keys)?;
    let report = engine.verify(&mut work)?;
    println!("{}", serde_json::to_string_pretty(&work)?);
    if !report.passed {
        println!("{}", serde_json::to_string_pretty(&report)?);
        anyhow::bail!("transaction verify failed");
    }

    if config.submit {
        let submitted = engine.submit(&work, &ledger)?;
        println!("{}", serde_json::to_string_pretty(&submitted)?);
    }
    Ok(())
}
