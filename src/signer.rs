use crate::codec::TransactionCodec;
use crate::error::BuildError;
use crate::model::{TransactionWork, WorkState};
use crate::provider::KeyService;

pub struct TransactionSigner<'a> {
    codec: &'a dyn TransactionCodec,
}

impl<'a> TransactionSigner<'a> {
    pub fn new(codec: &'a dyn TransactionCodec) -> Self {
        Self { codec }
    }

    /// Signs every request of every account in the work.
    pub fn sign(
        &self,
        work: &mut TransactionWork,
        keys: &dyn KeyService,
    ) -> Result<(), BuildError> {
        let accounts = work
            .signatures
            .accounts()
            .map(|group| group.account_id.clone())
            .collect::<Vec<_>>();
        if accounts.is_empty() {
            return Err(BuildError::MissingSignature(
                "transaction signature is empty".to_string(),
            ));
        }
        for account_id in accounts.iter() {
            self.sign_account(work, account_id, keys)?;
        }
        Ok(())
    }

    /// Signs the requests of one account, returning how many were signed.
    ///
    /// The work becomes `Signed` once no request of any account is pending.
    pub fn sign_account(
        &self,
        work: &mut TransactionWork,
        account_id: &str,
        keys: &dyn KeyService,
    ) -> Result<usize, BuildError> {
        match work.state {
            WorkState::Unbuilt => {
                return Err(BuildError::MissingSignature(
                    "transaction is not built".to_string(),
                ))
            }
            WorkState::Verified => {
                tracing::debug!("transaction is already verified");
                return Ok(0);
            }
            WorkState::Built | WorkState::Signed | WorkState::VerificationFailed => {}
        }

        let group = work
            .signatures
            .account_mut(account_id)
            .filter(|group| !group.signatures.is_empty())
            .ok_or_else(|| {
                BuildError::MissingSignature(format!(
                    "no signature requested from account {}",
                    account_id
                ))
            })?;

        for entry in group.signatures.iter_mut() {
            let key_error = |reason: String| BuildError::KeyDerivationFailed {
                address: entry.address.address.clone(),
                path: entry.address.hd_path.clone(),
                reason,
            };
            let secret = keys
                .derive_child_key(&entry.address.hd_path, entry.curve)
                .map_err(|err| key_error(format!("{:#}", err)))?;
            let public_key = self
                .codec
                .public_key(&secret)
                .map_err(|err| key_error(format!("{:#}", err)))?;
            if public_key != entry.address.public_key_hex {
                return Err(key_error(
                    "derived key does not match the address public key".to_string(),
                ));
            }

            let signature = self
                .codec
                .sign_digest(&entry.digest_hex, &secret)
                .map_err(|err| BuildError::SigningFailed(format!("{:#}", err)))?;
            entry.signature_hex = Some(signature);
        }
        let signed = group.signatures.len();

        tracing::info!("transaction hash sign success");
        if work.signatures.is_complete() {
            work.state = WorkState::Signed;
        }
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::P2pkhCodec;
    use crate::config::CoreConfig;
    use crate::engine::tests::built_transfer;
    use crate::error::BuildError;
    use crate::memory::tests::Fixture;
    use crate::memory::MemoryKeyStore;
    use crate::model::WorkState;
    use crate::signer::TransactionSigner;

    #[test]
    fn signs_every_request() {
        let fixture = Fixture::new(CoreConfig::default());
        let mut work = built_transfer(&fixture);
        let codec = P2pkhCodec::new();
        let signer = TransactionSigner::new(&codec);

        signer.sign(&mut work, &fixture.keys).unwrap();
        assert_eq!(work.state, WorkState::Signed);
        assert!(work.signatures.iter().all(|entry| entry.is_signed()));

        let first = work.signatures.by_input_index()[0].signature_hex.clone();
        signer.sign(&mut work, &fixture.keys).unwrap();
        assert_eq!(work.signatures.by_input_index()[0].signature_hex, first);
    }

    #[test]
    fn signs_single_account() {
        let fixture = Fixture::new(CoreConfig::default());
        let mut work = built_transfer(&fixture);
        let codec = P2pkhCodec::new();
        let signer = TransactionSigner::new(&codec);

        assert!(matches!(
            signer.sign_account(&mut work, "bob", &fixture.keys),
            Err(BuildError::MissingSignature(_))
        ));
        assert_eq!(
            signer
                .sign_account(&mut work, "alice", &fixture.keys)
                .unwrap(),
            work.inputs.len()
        );
        assert_eq!(work.state, WorkState::Signed);
    }

    #[test]
    fn missing_key_fails_derivation() {
        let fixture = Fixture::new(CoreConfig::default());
        let mut work = built_transfer(&fixture);
        let codec = P2pkhCodec::new();
        let signer = TransactionSigner::new(&codec);

        let result = signer.sign(&mut work, &MemoryKeyStore::default());
        assert!(matches!(
            result,
            Err(BuildError::KeyDerivationFailed { .. })
        ));
        assert_eq!(work.state, WorkState::Built);
    }
}
