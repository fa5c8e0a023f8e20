use crate::amount::Amount;
use crate::config::CurveType;
use crate::model::{AddressInfo, UnspentOutput};

/// Read access to the ledger's unspent outputs.
pub trait UtxoProvider {
    /// Unspent outputs of `addresses` with at least `min_confirmations`.
    fn list_unspent(
        &self,
        min_confirmations: u64,
        addresses: &[String],
    ) -> anyhow::Result<Vec<UnspentOutput>>;

    /// Looks up a single output, spent or not, for its locking script.
    fn get_output(&self, tx_id: &str, vout: u32) -> anyhow::Result<UnspentOutput>;

    /// Native balance per address, in the order of `addresses`.
    fn balance_of(&self, addresses: &[String]) -> anyhow::Result<Vec<(String, Amount)>> {
        let unspent = self.list_unspent(0, addresses)?;
        Ok(addresses
            .iter()
            .map(|address| {
                let balance = unspent
                    .iter()
                    .filter(|output| &output.address == address)
                    .map(|output| output.amount)
                    .sum();
                (address.clone(), balance)
            })
            .collect())
    }
}

pub trait FeeOracle {
    /// Current rate in base units per 1000 bytes.
    fn estimate_fee_rate(&self) -> anyhow::Result<Amount>;

    fn estimate_fee(&self, inputs: usize, outputs: usize, rate: Amount) -> anyhow::Result<Amount>;
}

pub trait OverlayBalanceProvider {
    /// Token balance of `address`, in token base units.
    fn overlay_balance(&self, property_id: u32, address: &str) -> anyhow::Result<Amount>;

    fn holds_overlay_assets(&self, address: &str) -> anyhow::Result<bool>;
}

pub trait KeyService {
    /// Secret key bytes at `hd_path`.
    fn derive_child_key(&self, hd_path: &str, curve: CurveType) -> anyhow::Result<Vec<u8>>;
}

pub trait AddressBook {
    /// Addresses of an account in enumeration order; `limit` of `None` means all.
    fn addresses(
        &self,
        account_id: &str,
        start: usize,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<AddressInfo>>;

    fn address_info(&self, address: &str) -> anyhow::Result<Option<AddressInfo>>;

    fn is_account_address(&self, account_id: &str, address: &str) -> anyhow::Result<bool> {
        Ok(self
            .address_info(address)?
            .map(|info| info.account_id == account_id)
            .unwrap_or(false))
    }
}

pub trait Broadcaster {
    /// Returns the id of the accepted transaction.
    fn submit_raw_transaction(&self, raw_hex: &str) -> anyhow::Result<String>;
}

/// The external collaborators one engine call needs.
#[derive(Clone, Copy)]
pub struct LedgerServices<'a> {
    pub utxos: &'a dyn UtxoProvider,
    pub fees: &'a dyn FeeOracle,
    pub overlay: &'a dyn OverlayBalanceProvider,
    pub address_book: &'a dyn AddressBook,
}
