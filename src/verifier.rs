use crate::codec::{InputUnlock, TransactionCodec};
use crate::config::{AddressPrefix, CoreConfig};
use crate::error::BuildError;
use crate::model::{TransactionWork, WorkState};
use crate::provider::UtxoProvider;
use serde::Serialize;

/// Outcome of a verification with everything needed to diagnose a failure.
#[derive(Clone, Debug, Serialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub signed_hex: String,
    pub unlocks: Vec<InputUnlock>,
    pub prefix: AddressPrefix,
}

pub struct TransactionVerifier<'a> {
    config: &'a CoreConfig,
    codec: &'a dyn TransactionCodec,
    utxos: &'a dyn UtxoProvider,
}

impl<'a> TransactionVerifier<'a> {
    pub fn new(
        config: &'a CoreConfig,
        codec: &'a dyn TransactionCodec,
        utxos: &'a dyn UtxoProvider,
    ) -> Self {
        Self {
            config,
            codec,
            utxos,
        }
    }

    /// Inserts the signatures and checks every input against its locking
    /// script. A passing work becomes `Verified` and carries the signed
    /// encoding; a failing one keeps its unsigned encoding.
    ///
    /// A work that is already verified is checked again without changes.
    pub fn verify(&self, work: &mut TransactionWork) -> Result<VerificationReport, BuildError> {
        if work.state == WorkState::Unbuilt {
            return Err(BuildError::MissingSignature(
                "transaction is not built".to_string(),
            ));
        }
        if work.signatures.is_empty() {
            return Err(BuildError::MissingSignature(
                "transaction signature is empty".to_string(),
            ));
        }

        let prefix = self.config.address_prefix();
        let unlocks = self.unlocks(work)?;

        if work.state == WorkState::Verified {
            let passed = self
                .codec
                .verify(&work.raw_hex, &unlocks, prefix)
                .map_err(|err| BuildError::EncodingFailed(format!("{:#}", err)))?;
            return Ok(VerificationReport {
                passed,
                signed_hex: work.raw_hex.clone(),
                unlocks,
                prefix,
            });
        }

        let signed_hex = self
            .codec
            .insert_signatures(&work.raw_hex, &unlocks)
            .map_err(|err| {
                BuildError::EncodingFailed(format!("transaction compose signatures failed: {:#}", err))
            })?;
        let passed = self
            .codec
            .verify(&signed_hex, &unlocks, prefix)
            .map_err(|err| BuildError::EncodingFailed(format!("{:#}", err)))?;

        if passed {
            tracing::debug!("transaction verify passed");
            work.raw_hex = signed_hex.clone();
            work.state = WorkState::Verified;
        } else {
            tracing::warn!(
                "transaction verify failed: signed {} unlocks {:?} prefix {:?}",
                signed_hex,
                unlocks,
                prefix
            );
            work.state = WorkState::VerificationFailed;
        }

        Ok(VerificationReport {
            passed,
            signed_hex,
            unlocks,
            prefix,
        })
    }

    /// One unlock per input, in input order, with locking scripts taken from
    /// the ledger rather than from the work.
    fn unlocks(&self, work: &TransactionWork) -> Result<Vec<InputUnlock>, BuildError> {
        let entries = work.signatures.by_input_index();
        if entries.len() != work.inputs.len() {
            return Err(BuildError::MissingSignature(format!(
                "{} signatures for {} inputs",
                entries.len(),
                work.inputs.len()
            )));
        }

        let mut unlocks = vec![];
        for (index, (input, entry)) in work.inputs.iter().zip(entries.into_iter()).enumerate() {
            if entry.input_index != index {
                return Err(BuildError::MissingSignature(format!(
                    "input {} has no signature request",
                    index
                )));
            }
            let signature_hex = entry.signature_hex.clone().ok_or_else(|| {
                BuildError::MissingSignature(format!(
                    "input {} of {} is not signed",
                    index, entry.address.address
                ))
            })?;
            let output = self.utxos.get_output(&input.tx_id, input.vout)?;
            tracing::debug!("Signature: {}", signature_hex);
            tracing::debug!("PublicKey: {}", entry.address.public_key_hex);

            unlocks.push(InputUnlock {
                input_index: index,
                address: entry.address.address.clone(),
                locking_script: output.locking_script,
                signature_hex,
                public_key_hex: entry.address.public_key_hex.clone(),
            });
        }
        Ok(unlocks)
    }
}
