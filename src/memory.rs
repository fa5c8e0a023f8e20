//! In-memory ledger and key store backed by P2PKH addresses.

use crate::amount::Amount;
use crate::codec::p2pkh::{locking_script, p2pkh_address, RawTransaction};
use crate::codec::{P2pkhCodec, TransactionCodec};
use crate::config::{AddressPrefix, CoreConfig, CurveType};
use crate::model::{AddressInfo, UnspentOutput};
use crate::provider::{AddressBook, Broadcaster, KeyService, OverlayBalanceProvider, UtxoProvider};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayHolding {
    pub address: String,
    pub property_id: u32,
    pub balance: Amount,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LedgerSnapshot {
    pub addresses: Vec<AddressInfo>,
    pub unspent: Vec<UnspentOutput>,
    pub spent: Vec<UnspentOutput>,
    pub overlay: Vec<OverlayHolding>,
}

/// Ledger node stand-in answering every provider trait from memory.
pub struct MemoryLedger {
    state: RefCell<LedgerSnapshot>,
    prefix: AddressPrefix,
    queries: Cell<usize>,
    next_tx: Cell<u64>,
}

impl MemoryLedger {
    pub fn new(snapshot: LedgerSnapshot, prefix: AddressPrefix) -> Self {
        Self {
            state: RefCell::new(snapshot),
            prefix,
            queries: Cell::new(0),
            next_tx: Cell::new(1),
        }
    }

    /// Number of provider queries answered so far.
    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    fn count_query(&self) {
        self.queries.set(self.queries.get() + 1);
    }

    pub fn register_address(&self, info: AddressInfo) {
        let mut state = self.state.borrow_mut();
        if !state.addresses.iter().any(|known| known.address == info.address) {
            state.addresses.push(info);
        }
    }

    pub fn add_unspent(
        &self,
        address: &str,
        amount: Amount,
        confirmations: u64,
        spendable: bool,
    ) -> anyhow::Result<UnspentOutput> {
        let script = locking_script(address, self.prefix)?;
        let tx_number = self.next_tx.get();
        self.next_tx.set(tx_number + 1);
        let output = UnspentOutput {
            tx_id: format!("{:064x}", tx_number),
            vout: 0,
            address: address.to_string(),
            amount,
            locking_script: hex::encode(script),
            spendable,
            confirmations,
        };
        self.state.borrow_mut().unspent.push(output.clone());
        Ok(output)
    }

    pub fn set_overlay_balance(&self, address: &str, property_id: u32, balance: Amount) {
        let mut state = self.state.borrow_mut();
        match state
            .overlay
            .iter_mut()
            .find(|holding| holding.address == address && holding.property_id == property_id)
        {
            Some(holding) => holding.balance = balance,
            None => state.overlay.push(OverlayHolding {
                address: address.to_string(),
                property_id,
                balance,
            }),
        }
    }
}

impl UtxoProvider for MemoryLedger {
    fn list_unspent(
        &self,
        min_confirmations: u64,
        addresses: &[String],
    ) -> anyhow::Result<Vec<UnspentOutput>> {
        self.count_query();
        Ok(self
            .state
            .borrow()
            .unspent
            .iter()
            .filter(|utxo| utxo.confirmations >= min_confirmations)
            .filter(|utxo| addresses.contains(&utxo.address))
            .cloned()
            .collect())
    }

    fn get_output(&self, tx_id: &str, vout: u32) -> anyhow::Result<UnspentOutput> {
        self.count_query();
        let state = self.state.borrow();
        state
            .unspent
            .iter()
            .chain(state.spent.iter())
            .find(|utxo| utxo.tx_id == tx_id && utxo.vout == vout)
            .cloned()
            .ok_or_else(|| anyhow!("output {}:{} not found", tx_id, vout))
    }
}

impl OverlayBalanceProvider for MemoryLedger {
    fn overlay_balance(&self, property_id: u32, address: &str) -> anyhow::Result<Amount> {
        self.count_query();
        Ok(self
            .state
            .borrow()
            .overlay
            .iter()
            .filter(|holding| holding.address == address && holding.property_id == property_id)
            .map(|holding| holding.balance)
            .sum())
    }

    fn holds_overlay_assets(&self, address: &str) -> anyhow::Result<bool> {
        self.count_query();
        Ok(self
            .state
            .borrow()
            .overlay
            .iter()
            .any(|holding| holding.address == address && !holding.balance.is_zero()))
    }
}

impl AddressBook for MemoryLedger {
    fn addresses(
        &self,
        account_id: &str,
        start: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<AddressInfo>> {
        self.count_query();
        Ok(self
            .state
            .borrow()
            .addresses
            .iter()
            .filter(|info| info.account_id == account_id)
            .skip(start)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn address_info(&self, address: &str) -> anyhow::Result<Option<AddressInfo>> {
        Ok(self
            .state
            .borrow()
            .addresses
            .iter()
            .find(|info| info.address == address)
            .cloned())
    }
}

impl Broadcaster for MemoryLedger {
    /// Spends the inputs and adds the paying outputs as unconfirmed.
    fn submit_raw_transaction(&self, raw_hex: &str) -> anyhow::Result<String> {
        let tx = RawTransaction::from_hex(raw_hex)?;
        let tx_id = tx.tx_id();
        let mut state = self.state.borrow_mut();

        for (prev_tx, vout) in tx.previous_outputs() {
            let position = state
                .unspent
                .iter()
                .position(|utxo| utxo.tx_id == prev_tx && utxo.vout == vout)
                .ok_or_else(|| anyhow!("input {}:{} is missing or spent", prev_tx, vout))?;
            let spent = state.unspent.remove(position);
            state.spent.push(spent);
        }

        let addresses = tx.output_addresses(self.prefix);
        for (vout, (address, value)) in addresses
            .into_iter()
            .zip(tx.output_values().into_iter())
            .enumerate()
        {
            if let Some(address) = address {
                let script = locking_script(&address, self.prefix)?;
                state.unspent.push(UnspentOutput {
                    tx_id: tx_id.clone(),
                    vout: vout as u32,
                    address,
                    amount: Amount::from(value),
                    locking_script: hex::encode(script),
                    spendable: true,
                    confirmations: 0,
                });
            }
        }

        Ok(tx_id)
    }
}

/// Secret keys by hd path.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn insert(&self, hd_path: &str, secret: Vec<u8>) {
        self.keys.borrow_mut().insert(hd_path.to_string(), secret);
    }
}

impl KeyService for MemoryKeyStore {
    fn derive_child_key(&self, hd_path: &str, curve: CurveType) -> anyhow::Result<Vec<u8>> {
        match curve {
            CurveType::Secp256k1 => self
                .keys
                .borrow()
                .get(hd_path)
                .cloned()
                .ok_or_else(|| anyhow!("no key at path {}", hd_path)),
        }
    }
}

/// Stores `secret` under `hd_path` and registers its P2PKH address for `account_id`.
pub fn register_key(
    ledger: &MemoryLedger,
    keys: &MemoryKeyStore,
    account_id: &str,
    hd_path: &str,
    secret: Vec<u8>,
) -> anyhow::Result<AddressInfo> {
    let public_key_hex = P2pkhCodec::new().public_key(&secret)?;
    let address = p2pkh_address(&hex::decode(&public_key_hex)?, ledger.prefix);
    let info = AddressInfo {
        address,
        account_id: account_id.to_string(),
        hd_path: hd_path.to_string(),
        public_key_hex,
    };
    keys.insert(hd_path, secret);
    ledger.register_address(info.clone());
    Ok(info)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedOutput {
    pub amount: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_spendable")]
    pub spendable: bool,
}

fn default_confirmations() -> u64 {
    6
}

fn default_spendable() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedHolding {
    pub property_id: u32,
    pub amount: String,
    pub decimals: u32,
}

/// One key of a demo wallet with the funds sitting on its address.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedKey {
    pub account_id: String,
    pub hd_path: String,
    pub secret_hex: String,
    #[serde(default)]
    pub outputs: Vec<SeedOutput>,
    #[serde(default)]
    pub overlay: Vec<SeedHolding>,
}

pub fn seed_ledger(
    seed: &[SeedKey],
    config: &CoreConfig,
) -> anyhow::Result<(MemoryLedger, MemoryKeyStore)> {
    let ledger = MemoryLedger::new(LedgerSnapshot::default(), config.address_prefix());
    let keys = MemoryKeyStore::default();

    for key in seed.iter() {
        let secret = hex::decode(&key.secret_hex)
            .with_context(|| format!("invalid secret of {}", key.hd_path))?;
        let info = register_key(&ledger, &keys, &key.account_id, &key.hd_path, secret)?;
        tracing::info!("{} [{}] {}", key.account_id, key.hd_path, info.address);

        for output in key.outputs.iter() {
            let amount = Amount::parse(&output.amount, config.decimals)?;
            ledger.add_unspent(&info.address, amount, output.confirmations, output.spendable)?;
        }
        for holding in key.overlay.iter() {
            let balance = Amount::parse(&holding.amount, holding.decimals)?;
            ledger.set_overlay_balance(&info.address, holding.property_id, balance);
        }
    }

    Ok((ledger, keys))
}
