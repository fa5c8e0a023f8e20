use crate::amount::Amount;
use crate::config::AddressPrefix;
use serde::{Deserialize, Serialize};

pub mod p2pkh;

pub use p2pkh::P2pkhCodec;

/// Overlay transfer type for a plain token send.
pub const SIMPLE_SEND: u16 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInputRef {
    pub tx_id: String,
    pub vout: u32,
    /// Hex encoded locking script of the spent output.
    pub locking_script: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayPayload {
    pub version: u16,
    pub transfer_type: u16,
    pub property_id: u32,
    /// Token quantity scaled to integer base units.
    pub amount: u64,
}

impl OverlayPayload {
    pub fn simple_send(property_id: u32, amount: u64) -> Self {
        Self {
            version: 0,
            transfer_type: SIMPLE_SEND,
            property_id,
            amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOutputSpec {
    Payment { address: String, value: Amount },
    OverlayMarker(OverlayPayload),
}

/// Everything needed to unlock one input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputUnlock {
    pub input_index: usize,
    pub address: String,
    pub locking_script: String,
    pub signature_hex: String,
    pub public_key_hex: String,
}

/// Wire encoding and signature primitives of the ledger.
///
/// All byte strings cross this boundary hex encoded.
pub trait TransactionCodec {
    fn build_unsigned(
        &self,
        inputs: &[TxInputRef],
        outputs: &[TxOutputSpec],
        prefix: AddressPrefix,
    ) -> anyhow::Result<String>;

    /// One digest per input of `raw_hex`, in input order.
    fn signing_digests(&self, raw_hex: &str, inputs: &[TxInputRef]) -> anyhow::Result<Vec<String>>;

    fn sign_digest(&self, digest_hex: &str, secret: &[u8]) -> anyhow::Result<String>;

    fn public_key(&self, secret: &[u8]) -> anyhow::Result<String>;

    /// Address that unlocks an output with `locking_script`.
    fn unlock_address(&self, locking_script: &str, prefix: AddressPrefix) -> anyhow::Result<String>;

    fn insert_signatures(&self, raw_hex: &str, unlocks: &[InputUnlock]) -> anyhow::Result<String>;

    fn verify(
        &self,
        signed_hex: &str,
        unlocks: &[InputUnlock],
        prefix: AddressPrefix,
    ) -> anyhow::Result<bool>;
}
