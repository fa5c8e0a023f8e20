use crate::amount::{check_decimals, Amount, AmountError, Balance};
use crate::config::{CoreConfig, CurveType};
use crate::tx_utils::output_accumulator::OutputAmounts;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Reference to an output of a previous transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputPointer {
    pub tx_id: String,
    pub vout: u32,
}

impl fmt::Display for OutputPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.vout)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub tx_id: String,
    pub vout: u32,
    pub address: String,
    pub amount: Amount,
    /// Hex encoded locking script of the output.
    pub locking_script: String,
    #[serde(default = "default_spendable")]
    pub spendable: bool,
    #[serde(default)]
    pub confirmations: u64,
}

fn default_spendable() -> bool {
    true
}

impl UnspentOutput {
    pub fn pointer(&self) -> OutputPointer {
        OutputPointer {
            tx_id: self.tx_id.clone(),
            vout: self.vout,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayAsset {
    pub property_id: u32,
    pub symbol: String,
    pub decimals: u32,
}

impl OverlayAsset {
    pub fn validate(&self) -> Result<(), AmountError> {
        check_decimals(self.decimals)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetDescriptor {
    Native,
    Overlay(OverlayAsset),
}

impl AssetDescriptor {
    pub fn symbol(&self, config: &CoreConfig) -> String {
        match self {
            AssetDescriptor::Native => config.symbol.clone(),
            AssetDescriptor::Overlay(asset) => asset.symbol.clone(),
        }
    }

    pub fn decimals(&self, config: &CoreConfig) -> u32 {
        match self {
            AssetDescriptor::Native => config.decimals,
            AssetDescriptor::Overlay(asset) => asset.decimals,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferRequest {
    pub asset: AssetDescriptor,
    pub account_id: String,
    /// Receivers in the order their outputs are laid out.
    pub destinations: Vec<(String, Amount)>,
    #[serde(default)]
    pub fee_rate: Option<Amount>,
}

impl TransferRequest {
    pub fn total_send(&self) -> Result<Amount, AmountError> {
        self.destinations
            .iter()
            .try_fold(Amount::ZERO, |total, (_, amount)| total.checked_add(*amount))
            .ok_or_else(|| {
                AmountError::Overflow(format!(
                    "sum of {} destinations",
                    self.destinations.len()
                ))
            })
    }

    /// First address listed twice among the destinations.
    pub fn repeated_destination(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.destinations
            .iter()
            .map(|(address, _)| address.as_str())
            .find(|address| !seen.insert(*address))
    }
}

/// Address book entry: who owns an address and how to derive its key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    pub account_id: String,
    pub hd_path: String,
    pub public_key_hex: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub input_index: usize,
    pub address: AddressInfo,
    pub curve: CurveType,
    pub digest_hex: String,
    pub signature_hex: Option<String>,
}

impl KeySignature {
    pub fn is_signed(&self) -> bool {
        self.signature_hex.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSignatures {
    pub account_id: String,
    pub signatures: Vec<KeySignature>,
}

/// Signature requests of one transaction, grouped by the owning account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureSet(Vec<AccountSignatures>);

impl SignatureSet {
    pub fn push(&mut self, signature: KeySignature) {
        let account_id = signature.address.account_id.clone();
        match self
            .0
            .iter_mut()
            .find(|group| group.account_id == account_id)
        {
            Some(group) => group.signatures.push(signature),
            None => self.0.push(AccountSignatures {
                account_id,
                signatures: vec![signature],
            }),
        }
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountSignatures> {
        self.0.iter()
    }

    pub fn account(&self, account_id: &str) -> Option<&AccountSignatures> {
        self.0.iter().find(|group| group.account_id == account_id)
    }

    pub fn account_mut(&mut self, account_id: &str) -> Option<&mut AccountSignatures> {
        self.0.iter_mut().find(|group| group.account_id == account_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|group| group.signatures.is_empty())
    }

    pub fn is_complete(&self) -> bool {
        !self.is_empty() && self.iter().all(KeySignature::is_signed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeySignature> {
        self.0.iter().flat_map(|group| group.signatures.iter())
    }

    /// All entries across accounts, ordered by the input they unlock.
    pub fn by_input_index(&self) -> Vec<&KeySignature> {
        let mut entries = self.iter().collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.input_index);
        entries
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDigest {
    pub digest_hex: String,
    pub unlock_address: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    #[default]
    Unbuilt,
    Built,
    Signed,
    Verified,
    VerificationFailed,
}

/// A transaction moving through build, sign and verify.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionWork {
    /// Unsigned encoding until verification passes, the signed one after.
    pub raw_hex: String,
    pub asset: AssetDescriptor,
    pub account_id: String,
    pub inputs: Vec<UnspentOutput>,
    pub outputs: OutputAmounts,
    /// Token quantity of the overlay marker, in token base units.
    pub overlay_amount: Option<Amount>,
    pub input_digests: Vec<InputDigest>,
    pub signatures: SignatureSet,
    pub fee: Amount,
    pub fee_rate: Amount,
    pub net_account_amount: Balance,
    pub tx_from: Vec<String>,
    pub tx_to: Vec<String>,
    pub state: WorkState,
}

impl TransactionWork {
    pub fn is_completed(&self) -> bool {
        self.state == WorkState::Verified
    }

    pub fn completed(&self) -> Option<CompletedTransaction> {
        if !self.is_completed() {
            return None;
        }
        Some(CompletedTransaction {
            raw_signed_hex: self.raw_hex.clone(),
            verified: true,
            total_fee: self.fee,
            net_account_amount: self.net_account_amount,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTransaction {
    pub raw_signed_hex: String,
    pub verified: bool,
    pub total_fee: Amount,
    pub net_account_amount: Balance,
}

/// Record of a broadcast transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedTransaction {
    pub tx_id: String,
    pub account_id: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub amount: Balance,
    pub decimals: u32,
    pub fees: Amount,
}
