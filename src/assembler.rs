use crate::amount::{Amount, Balance};
use crate::codec::{OverlayPayload, TransactionCodec};
use crate::config::CoreConfig;
use crate::error::BuildError;
use crate::model::{
    AssetDescriptor, InputDigest, KeySignature, OverlayAsset, SignatureSet, TransactionWork,
    UnspentOutput, WorkState,
};
use crate::provider::AddressBook;
use crate::tx_utils::balance_verification::verify_io_balance;
use crate::tx_utils::change_extraction::extract_changes;
use crate::tx_utils::output_accumulator::OutputAmounts;
use crate::tx_utils::output_utils::{
    output_specs, transfer_record, tx_from_records, tx_to_records, utxos_to_input_refs,
};
use std::collections::HashSet;

pub enum PlanLayout {
    Native,
    /// Token send of `amount` (token base units) to `recipient`, whose native
    /// output must already be part of the plan's outputs.
    Overlay {
        asset: OverlayAsset,
        recipient: String,
        amount: Amount,
    },
}

/// Inputs and outputs decided by selection, ready to be encoded.
pub struct AssemblyPlan {
    pub layout: PlanLayout,
    pub account_id: String,
    pub inputs: Vec<UnspentOutput>,
    pub outputs: OutputAmounts,
    pub fee: Amount,
    pub fee_rate: Amount,
}

/// Destinations followed by change, if any, to `change_address`.
pub fn native_outputs(
    destinations: &[(String, Amount)],
    change_address: &str,
    change: Amount,
) -> OutputAmounts {
    let mut outputs = OutputAmounts::new();
    for (address, amount) in destinations.iter() {
        outputs.append(address, *amount);
    }
    if !change.is_zero() {
        outputs.append(change_address, change);
    }
    outputs
}

pub struct TransactionAssembler<'a> {
    config: &'a CoreConfig,
    codec: &'a dyn TransactionCodec,
    address_book: &'a dyn AddressBook,
}

impl<'a> TransactionAssembler<'a> {
    pub fn new(
        config: &'a CoreConfig,
        codec: &'a dyn TransactionCodec,
        address_book: &'a dyn AddressBook,
    ) -> Self {
        Self {
            config,
            codec,
            address_book,
        }
    }

    pub fn assemble(&self, plan: AssemblyPlan) -> Result<TransactionWork, BuildError> {
        let AssemblyPlan {
            layout,
            account_id,
            inputs,
            mut outputs,
            fee,
            fee_rate,
        } = plan;

        if inputs.is_empty() {
            return Err(BuildError::EmptyInputSet);
        }
        if outputs.is_empty() {
            return Err(BuildError::EmptyDestinationSet);
        }
        if inputs.len() > self.config.max_tx_inputs {
            return Err(BuildError::TooManyInputs {
                count: inputs.len(),
                max: self.config.max_tx_inputs,
            });
        }

        let marker = match &layout {
            PlanLayout::Native => None,
            PlanLayout::Overlay {
                asset,
                recipient,
                amount,
            } => {
                if outputs.get(recipient).is_none() {
                    return Err(BuildError::EncodingFailed(format!(
                        "no native output for overlay recipient {}",
                        recipient
                    )));
                }
                outputs.move_to_end(recipient);
                Some(OverlayPayload::simple_send(asset.property_id, amount.units()))
            }
        };

        verify_io_balance(&inputs, &outputs, &fee)
            .map_err(|err| BuildError::EncodingFailed(err.to_string()))?;

        let prefix = self.config.address_prefix();
        let input_refs = utxos_to_input_refs(&inputs);
        let raw_hex = self
            .codec
            .build_unsigned(&input_refs, &output_specs(&outputs, marker), prefix)
            .map_err(|err| BuildError::EncodingFailed(format!("{:#}", err)))?;
        let digests = self
            .codec
            .signing_digests(&raw_hex, &input_refs)
            .map_err(|err| BuildError::EncodingFailed(format!("{:#}", err)))?;

        let mut input_digests = vec![];
        let mut signatures = SignatureSet::default();
        for (index, (input, digest_hex)) in inputs.iter().zip(digests.into_iter()).enumerate() {
            let unlock_address = self
                .codec
                .unlock_address(&input.locking_script, prefix)
                .map_err(|err| BuildError::EncodingFailed(format!("{:#}", err)))?;
            tracing::debug!("txHash[{}]: {}", index, digest_hex);

            let info = self
                .address_book
                .address_info(&unlock_address)?
                .ok_or_else(|| BuildError::UnknownAddress(unlock_address.clone()))?;
            signatures.push(KeySignature {
                input_index: index,
                address: info,
                curve: self.config.curve,
                digest_hex: digest_hex.clone(),
                signature_hex: None,
            });
            input_digests.push(InputDigest {
                digest_hex,
                unlock_address,
            });
        }

        let own_addresses = self.own_addresses(&account_id, &outputs)?;
        let mut net_account_amount = Balance::zero();
        let (asset, overlay_amount, tx_from, tx_to) = match layout {
            PlanLayout::Native => {
                let structure = extract_changes(&outputs, |address| {
                    own_addresses.contains(address)
                });
                net_account_amount -= &structure.sent_outside();
                net_account_amount -= &fee;
                (
                    AssetDescriptor::Native,
                    None,
                    tx_from_records(&inputs, self.config.decimals),
                    tx_to_records(&outputs, self.config.decimals),
                )
            }
            PlanLayout::Overlay {
                asset,
                recipient,
                amount,
            } => {
                if !own_addresses.contains(&recipient) {
                    net_account_amount -= &amount;
                }
                let tx_from = vec![transfer_record(&inputs[0].address, amount, asset.decimals)];
                let tx_to = vec![transfer_record(&recipient, amount, asset.decimals)];
                (AssetDescriptor::Overlay(asset), Some(amount), tx_from, tx_to)
            }
        };

        Ok(TransactionWork {
            raw_hex,
            asset,
            account_id,
            inputs,
            outputs,
            overlay_amount,
            input_digests,
            signatures,
            fee,
            fee_rate,
            net_account_amount,
            tx_from,
            tx_to,
            state: WorkState::Built,
        })
    }

    fn own_addresses(
        &self,
        account_id: &str,
        outputs: &OutputAmounts,
    ) -> Result<HashSet<String>, BuildError> {
        let mut own = HashSet::new();
        for (address, _) in outputs.iter() {
            if self.address_book.is_account_address(account_id, address)? {
                own.insert(address.to_string());
            }
        }
        Ok(own)
    }
}
