use crate::amount::Amount;
use crate::assembler::{native_outputs, AssemblyPlan, PlanLayout, TransactionAssembler};
use crate::codec::TransactionCodec;
use crate::config::CoreConfig;
use crate::error::BuildError;
use crate::model::{
    AssetDescriptor, OverlayAsset, SubmittedTransaction, TransactionWork, TransferRequest,
    UnspentOutput,
};
use crate::provider::{Broadcaster, KeyService, LedgerServices};
use crate::selection::{CoinSelector, SelectionError};
use crate::signer::TransactionSigner;
use crate::sweep::{CancelFlag, SweepBatcher, SweepParams, SweepUnit};
use crate::tx_utils::output_accumulator::OutputAmounts;
use crate::verifier::{TransactionVerifier, VerificationReport};
use itertools::Itertools;

/// Unit of the rate returned by [`TxEngine::fee_rate`]: base units per kilobyte.
pub const FEE_RATE_UNIT: &str = "K";

/// Entry point tying selection, assembly, signing and verification together.
pub struct TxEngine<'a> {
    config: &'a CoreConfig,
    codec: &'a dyn TransactionCodec,
    services: LedgerServices<'a>,
}

impl<'a> TxEngine<'a> {
    pub fn new(
        config: &'a CoreConfig,
        codec: &'a dyn TransactionCodec,
        services: LedgerServices<'a>,
    ) -> Self {
        Self {
            config,
            codec,
            services,
        }
    }

    pub fn fee_rate(&self) -> Result<(Amount, &'static str), BuildError> {
        Ok((self.services.fees.estimate_fee_rate()?, FEE_RATE_UNIT))
    }

    pub fn build_transfer(&self, request: &TransferRequest) -> Result<TransactionWork, BuildError> {
        match &request.asset {
            AssetDescriptor::Native => self.build_native(request),
            AssetDescriptor::Overlay(asset) => self.build_overlay(request, asset),
        }
    }

    pub fn sign(&self, work: &mut TransactionWork, keys: &dyn KeyService) -> Result<(), BuildError> {
        TransactionSigner::new(self.codec).sign(work, keys)
    }

    pub fn sign_account(
        &self,
        work: &mut TransactionWork,
        account_id: &str,
        keys: &dyn KeyService,
    ) -> Result<usize, BuildError> {
        TransactionSigner::new(self.codec).sign_account(work, account_id, keys)
    }

    pub fn verify(&self, work: &mut TransactionWork) -> Result<VerificationReport, BuildError> {
        TransactionVerifier::new(self.config, self.codec, self.services.utxos).verify(work)
    }

    pub fn sweep_account(
        &self,
        params: &SweepParams,
        cancel: &CancelFlag,
    ) -> Result<Vec<SweepUnit>, BuildError> {
        SweepBatcher::new(self.config, self.codec, self.services).sweep(params, cancel)
    }

    /// Broadcasts a verified work.
    pub fn submit(
        &self,
        work: &TransactionWork,
        broadcaster: &dyn Broadcaster,
    ) -> Result<SubmittedTransaction, BuildError> {
        let completed = work.completed().ok_or(BuildError::NotVerified)?;
        let tx_id = broadcaster.submit_raw_transaction(&completed.raw_signed_hex)?;
        tracing::info!(
            "submit {} transaction success: {}",
            work.asset.symbol(self.config),
            tx_id
        );

        // overlay transfers report the token movement, the native fee is not theirs
        let fees = match &work.asset {
            AssetDescriptor::Native => completed.total_fee,
            AssetDescriptor::Overlay(_) => Amount::ZERO,
        };
        let decimals = work.asset.decimals(self.config);
        Ok(SubmittedTransaction {
            tx_id,
            account_id: work.account_id.clone(),
            from: work.tx_from.clone(),
            to: work.tx_to.clone(),
            amount: completed.net_account_amount,
            decimals,
            fees,
        })
    }

    fn account_addresses(&self, account_id: &str) -> Result<Vec<String>, BuildError> {
        let addresses = self
            .services
            .address_book
            .addresses(account_id, 0, None)?
            .into_iter()
            .map(|info| info.address)
            .collect::<Vec<_>>();
        if addresses.is_empty() {
            return Err(BuildError::AccountHasNoAddresses(account_id.to_string()));
        }
        Ok(addresses)
    }

    fn resolve_fee_rate(&self, requested: Option<Amount>) -> Result<Amount, BuildError> {
        match requested {
            Some(rate) => Ok(rate),
            None => Ok(self.services.fees.estimate_fee_rate()?),
        }
    }

    fn build_native(&self, request: &TransferRequest) -> Result<TransactionWork, BuildError> {
        if request.destinations.is_empty() {
            return Err(BuildError::EmptyDestinationSet);
        }
        if let Some(address) = request.repeated_destination() {
            return Err(BuildError::RepeatedDestination(address.to_string()));
        }
        let total_send = request.total_send()?;

        let decimals = self.config.decimals;
        let addresses = self.account_addresses(&request.account_id)?;
        let unspent = self.services.utxos.list_unspent(0, &addresses)?;
        if unspent.is_empty() {
            return Err(BuildError::InsufficientBalance {
                account: request.account_id.clone(),
                symbol: self.config.symbol.clone(),
                available: Amount::ZERO.fixed(decimals).to_string(),
                required: total_send.fixed(decimals).to_string(),
            });
        }

        let fee_rate = self.resolve_fee_rate(request.fee_rate)?;
        tracing::debug!(
            "select {} of {} outputs at fee rate {}",
            total_send.fixed(decimals),
            unspent.len(),
            fee_rate
        );
        let output_count = request.destinations.len() + 1;
        let selection = CoinSelector::new(self.services.fees, self.config.max_tx_inputs)
            .select(&unspent, total_send, fee_rate, |_| output_count)
            .map_err(|err| match err {
                SelectionError::Insufficient {
                    available,
                    required,
                } => BuildError::InsufficientBalance {
                    account: request.account_id.clone(),
                    symbol: self.config.symbol.clone(),
                    available: available.fixed(decimals).to_string(),
                    required: required.fixed(decimals).to_string(),
                },
                SelectionError::InsufficientSpendable {
                    spendable,
                    required,
                } => BuildError::InsufficientSpendableFunds {
                    account: request.account_id.clone(),
                    symbol: self.config.symbol.clone(),
                    spendable: spendable.fixed(decimals).to_string(),
                    required: required.fixed(decimals).to_string(),
                },
                other => selection_failure(other),
            })?;

        let change = selection.change(total_send);
        let change_address = selection.chosen[0].address.clone();
        tracing::info!("-----------------------------------------------");
        tracing::info!("From Account: {}", request.account_id);
        tracing::info!(
            "To Address: {}",
            request
                .destinations
                .iter()
                .map(|(address, _)| address.as_str())
                .join(", ")
        );
        tracing::info!("Use: {}", selection.balance.fixed(decimals));
        tracing::info!("Fees: {}", selection.fee.fixed(decimals));
        tracing::info!("Receive: {}", total_send.fixed(decimals));
        tracing::info!("Change: {}", change.fixed(decimals));
        tracing::info!("Change Address: {}", change_address);
        tracing::info!("-----------------------------------------------");

        let outputs = native_outputs(&request.destinations, &change_address, change);
        TransactionAssembler::new(self.config, self.codec, self.services.address_book).assemble(
            AssemblyPlan {
                layout: PlanLayout::Native,
                account_id: request.account_id.clone(),
                inputs: selection.chosen,
                outputs,
                fee: selection.fee,
                fee_rate,
            },
        )
    }

    /// Token send from a single holding address; the native transfer cost and
    /// fee come from that address first and from token-less addresses after.
    fn build_overlay(
        &self,
        request: &TransferRequest,
        asset: &OverlayAsset,
    ) -> Result<TransactionWork, BuildError> {
        if !self.config.overlay.enabled {
            return Err(BuildError::OverlayUnsupported {
                symbol: self.config.symbol.clone(),
            });
        }
        let (recipient, amount) = match request.destinations.as_slice() {
            [] => return Err(BuildError::EmptyDestinationSet),
            [destination] => destination.clone(),
            _ => return Err(BuildError::OverlayMultiRecipientUnsupported),
        };
        asset.validate()?;

        let addresses = self.account_addresses(&request.account_id)?;
        let mut total_token = Amount::ZERO;
        let mut sender: Option<(String, Amount, Vec<UnspentOutput>)> = None;
        let mut fee_funding = vec![];
        for address in addresses.into_iter() {
            let token_balance = self
                .services
                .overlay
                .overlay_balance(asset.property_id, &address)?;
            if token_balance.is_zero() {
                fee_funding.push(address);
                continue;
            }
            total_token += token_balance;

            let qualified = matches!(
                &sender,
                Some((_, balance, outputs)) if *balance >= amount && outputs.iter().any(|o| o.spendable)
            );
            if !qualified {
                let outputs = self.services.utxos.list_unspent(0, &[address.clone()])?;
                sender = Some((address, token_balance, outputs));
            }
        }

        if total_token < amount {
            return Err(BuildError::InsufficientTokenBalance {
                account: request.account_id.clone(),
                symbol: asset.symbol.clone(),
                available: total_token.fixed(asset.decimals).to_string(),
                required: amount.fixed(asset.decimals).to_string(),
            });
        }
        let (sender, token_balance, mut ordered) = match sender {
            Some(sender) => sender,
            None => {
                return Err(BuildError::InsufficientTokenBalance {
                    account: request.account_id.clone(),
                    symbol: asset.symbol.clone(),
                    available: total_token.fixed(asset.decimals).to_string(),
                    required: amount.fixed(asset.decimals).to_string(),
                })
            }
        };
        if token_balance < amount {
            return Err(BuildError::InsufficientFees {
                address: sender,
                symbol: asset.symbol.clone(),
                available: token_balance.fixed(asset.decimals).to_string(),
                required: amount.fixed(asset.decimals).to_string(),
            });
        }
        let transfer_cost = self.config.overlay.transfer_cost;
        if !ordered.iter().any(|output| output.spendable) {
            return Err(BuildError::InsufficientFees {
                address: sender,
                symbol: self.config.symbol.clone(),
                available: Amount::ZERO.fixed(self.config.decimals).to_string(),
                required: transfer_cost.fixed(self.config.decimals).to_string(),
            });
        }

        ordered.sort_by_key(|output| output.amount);
        if !fee_funding.is_empty() {
            ordered.extend(self.services.utxos.list_unspent(0, &fee_funding)?);
        }

        let fee_rate = self.resolve_fee_rate(request.fee_rate)?;
        let decimals = self.config.decimals;
        let selection = CoinSelector::new(self.services.fees, self.config.max_tx_inputs)
            .select_ordered(&ordered, transfer_cost, fee_rate, |_| 3)
            .map_err(|err| match err {
                SelectionError::Insufficient {
                    available,
                    required,
                } => BuildError::InsufficientFees {
                    address: sender.clone(),
                    symbol: self.config.symbol.clone(),
                    available: available.fixed(decimals).to_string(),
                    required: required.fixed(decimals).to_string(),
                },
                SelectionError::InsufficientSpendable {
                    spendable,
                    required,
                } => BuildError::InsufficientFees {
                    address: sender.clone(),
                    symbol: self.config.symbol.clone(),
                    available: spendable.fixed(decimals).to_string(),
                    required: required.fixed(decimals).to_string(),
                },
                other => selection_failure(other),
            })?;

        let change = selection.change(transfer_cost);
        let change_address = selection.chosen[0].address.clone();
        tracing::info!("-----------------------------------------------");
        tracing::info!("From Account: {}", request.account_id);
        tracing::info!("From Address: {}", sender);
        tracing::info!("To Address: {}", recipient);
        tracing::info!("Use: {}", selection.balance.fixed(decimals));
        tracing::info!("Fees: {}", selection.fee.fixed(decimals));
        tracing::info!("Receive: {}", amount.fixed(asset.decimals));
        tracing::info!("Change: {}", change.fixed(decimals));
        tracing::info!("Change Address: {}", change_address);
        tracing::info!("-----------------------------------------------");

        let mut outputs = OutputAmounts::new();
        outputs.append(&recipient, transfer_cost);
        if !change.is_zero() {
            outputs.append(&change_address, change);
        }
        TransactionAssembler::new(self.config, self.codec, self.services.address_book).assemble(
            AssemblyPlan {
                layout: PlanLayout::Overlay {
                    asset: asset.clone(),
                    recipient,
                    amount,
                },
                account_id: request.account_id.clone(),
                inputs: selection.chosen,
                outputs,
                fee: selection.fee,
                fee_rate,
            },
        )
    }
}

/// Selection failures that do not depend on the asset being moved.
pub(crate) fn selection_failure(err: SelectionError) -> BuildError {
    match err {
        SelectionError::TooManyInputs { count, max } => BuildError::TooManyInputs { count, max },
        SelectionError::Fee(err) => BuildError::Provider(err),
        SelectionError::Insufficient {
            available,
            required,
        } => BuildError::Provider(anyhow::anyhow!(
            "balance {} is not enough, {} required",
            available,
            required
        )),
        SelectionError::InsufficientSpendable {
            spendable,
            required,
        } => BuildError::Provider(anyhow::anyhow!(
            "spendable balance {} is not enough, {} required",
            spendable,
            required
        )),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::amount::{Amount, AmountError, Balance};
    use crate::codec::p2pkh::RawTransaction;
    use crate::codec::P2pkhCodec;
    use crate::config::CoreConfig;
    use crate::engine::TxEngine;
    use crate::error::BuildError;
    use crate::fee::FixedRateOracle;
    use crate::memory::tests::Fixture;
    use crate::model::{
        AssetDescriptor, OverlayAsset, TransactionWork, TransferRequest, WorkState,
    };
    use crate::provider::UtxoProvider;

    fn usdt() -> AssetDescriptor {
        AssetDescriptor::Overlay(OverlayAsset {
            property_id: 31,
            symbol: "USDT".to_string(),
            decimals: 8,
        })
    }

    fn overlay_config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.overlay.enabled = true;
        config
    }

    fn request(asset: AssetDescriptor, destinations: Vec<(String, Amount)>) -> TransferRequest {
        TransferRequest {
            asset,
            account_id: "alice".to_string(),
            destinations,
            fee_rate: None,
        }
    }

    /// Native transfer of 50_000 units from two funded alice addresses to a
    /// foreign address, with a rate making the fee equal to the size in bytes.
    pub fn built_transfer(fixture: &Fixture) -> TransactionWork {
        fixture.fund("alice", 0, 60_000);
        fixture.fund("alice", 1, 30_000);
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));
        engine
            .build_transfer(&request(
                AssetDescriptor::Native,
                vec![(fixture.foreign_address(), Amount::from(50_000))],
            ))
            .unwrap()
    }

    #[test]
    fn native_transfer_layout() {
        let fixture = Fixture::new(CoreConfig::default());
        let work = built_transfer(&fixture);

        assert_eq!(work.state, WorkState::Built);
        assert_eq!(work.inputs.len(), 2);
        assert_eq!(work.inputs[0].amount, Amount::from(30_000));
        assert_eq!(work.fee, Amount::from(148 * 2 + 34 * 2 + 10));
        let inputs: Amount = work.inputs.iter().map(|input| input.amount).sum();
        assert_eq!(inputs, work.outputs.total() + work.fee);
        assert_eq!(
            work.outputs.get(&fixture.address("alice", 1)),
            Some(Amount::from(90_000 - 50_000 - 374))
        );
        assert_eq!(
            work.net_account_amount,
            Balance::Debt(Amount::from(50_000 + 374))
        );
    }

    #[test]
    fn native_transfer_end_to_end() {
        let fixture = Fixture::new(CoreConfig::default());
        let mut work = built_transfer(&fixture);
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));

        assert!(matches!(
            engine.submit(&work, &fixture.ledger),
            Err(BuildError::NotVerified)
        ));

        engine.sign(&mut work, &fixture.keys).unwrap();
        assert!(engine.verify(&mut work).unwrap().passed);
        let submitted = engine.submit(&work, &fixture.ledger).unwrap();

        assert_eq!(submitted.account_id, "alice");
        assert_eq!(submitted.fees, Amount::from(374));
        assert_eq!(submitted.amount, Balance::Debt(Amount::from(50_374)));
        assert_eq!(
            submitted.tx_id,
            RawTransaction::from_hex(&work.raw_hex).unwrap().tx_id()
        );
        let received = fixture
            .ledger
            .list_unspent(0, &[fixture.foreign_address()])
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].amount, Amount::from(50_000));
        assert_eq!(received[0].confirmations, 0);
    }

    #[test]
    fn fee_rate_has_unit() {
        let fixture = Fixture::new(CoreConfig::default());
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));
        assert_eq!(engine.fee_rate().unwrap(), (Amount::from(1_000), "K"));
    }

    #[test]
    fn native_failures() {
        let fixture = Fixture::new(CoreConfig::default());
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));
        let to = vec![(fixture.foreign_address(), Amount::from(5_000))];

        assert!(matches!(
            engine.build_transfer(&request(AssetDescriptor::Native, vec![])),
            Err(BuildError::EmptyDestinationSet)
        ));
        assert_eq!(fixture.ledger.queries(), 0);
        assert!(matches!(
            engine.build_transfer(&request(AssetDescriptor::Native, to.clone())),
            Err(BuildError::AccountHasNoAddresses(_))
        ));

        fixture.fund("alice", 0, 5_000);
        assert!(matches!(
            engine.build_transfer(&request(AssetDescriptor::Native, to.clone())),
            Err(BuildError::InsufficientBalance { .. })
        ));

        fixture.fund_with("alice", 1, 10_000, 6, false);
        assert!(matches!(
            engine.build_transfer(&request(AssetDescriptor::Native, to)),
            Err(BuildError::InsufficientSpendableFunds { .. })
        ));
    }

    #[test]
    fn malformed_destinations_are_rejected() {
        let fixture = Fixture::new(CoreConfig::default());
        fixture.fund("alice", 0, 10_000);
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));

        let half = Amount::from(u64::MAX / 2 + 1);
        let result = engine.build_transfer(&request(
            AssetDescriptor::Native,
            vec![(fixture.foreign(0), half), (fixture.foreign(1), half)],
        ));
        assert!(matches!(
            result,
            Err(BuildError::InvalidAmount(AmountError::Overflow(_)))
        ));

        let result = engine.build_transfer(&request(
            AssetDescriptor::Native,
            vec![
                (fixture.foreign(0), Amount::from(10)),
                (fixture.foreign(0), Amount::from(20)),
            ],
        ));
        assert!(matches!(
            result,
            Err(BuildError::RepeatedDestination(address)) if address == fixture.foreign(0)
        ));
        assert_eq!(fixture.ledger.queries(), 0);
    }

    #[test]
    fn overlay_checks_precede_queries() {
        let fixture = Fixture::new(overlay_config());
        fixture.fund("alice", 0, 10_000);
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));

        let result = engine.build_transfer(&request(
            usdt(),
            vec![
                (fixture.foreign(0), Amount::from(1)),
                (fixture.foreign(1), Amount::from(1)),
            ],
        ));
        assert!(matches!(
            result,
            Err(BuildError::OverlayMultiRecipientUnsupported)
        ));
        assert_eq!(fixture.ledger.queries(), 0);

        let disabled = CoreConfig::default();
        let engine = TxEngine::new(&disabled, &codec, fixture.services(&fees));
        let result =
            engine.build_transfer(&request(usdt(), vec![(fixture.foreign(0), Amount::from(1))]));
        assert!(matches!(result, Err(BuildError::OverlayUnsupported { .. })));
        assert_eq!(fixture.ledger.queries(), 0);
    }

    #[test]
    fn overlay_transfer_layout() {
        let fixture = Fixture::new(overlay_config());
        let sender = fixture.address("alice", 0);
        fixture.set_tokens("alice", 0, 31, 1_000);
        fixture.fund("alice", 0, 10_000);
        fixture.fund("alice", 1, 500);
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));
        let recipient = fixture.foreign_address();

        let work = engine
            .build_transfer(&request(usdt(), vec![(recipient.clone(), Amount::from(600))]))
            .unwrap();

        // one input, three outputs
        let fee = 148 + 34 * 3 + 10;
        assert_eq!(work.fee, Amount::from(fee));
        assert_eq!(work.inputs.len(), 1);
        assert_eq!(work.inputs[0].address, sender);
        let tx = RawTransaction::from_hex(&work.raw_hex).unwrap();
        assert_eq!(tx.output_values(), vec![0, 10_000 - 546 - fee, 546]);
        assert_eq!(tx.overlay_payload().unwrap().amount, 600);
        assert_eq!(work.net_account_amount, Balance::Debt(Amount::from(600)));
        assert_eq!(work.tx_from, vec![format!("{}:0.00000600", sender)]);

        let mut work = work;
        engine.sign(&mut work, &fixture.keys).unwrap();
        assert!(engine.verify(&mut work).unwrap().passed);
        let submitted = engine.submit(&work, &fixture.ledger).unwrap();
        assert_eq!(submitted.fees, Amount::ZERO);
        assert_eq!(submitted.decimals, 8);
    }

    #[test]
    fn overlay_fee_funding_from_token_less_address() {
        let fixture = Fixture::new(overlay_config());
        let sender = fixture.address("alice", 0);
        let funding = fixture.address("alice", 1);
        fixture.set_tokens("alice", 0, 31, 1_000);
        fixture.fund("alice", 0, 300);
        fixture.fund("alice", 1, 5_000);
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));

        let work = engine
            .build_transfer(&request(
                usdt(),
                vec![(fixture.foreign_address(), Amount::from(600))],
            ))
            .unwrap();

        let fee = 148 * 2 + 34 * 3 + 10;
        assert_eq!(work.inputs.len(), 2);
        assert_eq!(work.inputs[0].address, sender);
        assert_eq!(work.inputs[1].address, funding);
        assert_eq!(
            work.outputs.get(&sender),
            Some(Amount::from(300 + 5_000 - 546 - fee))
        );
        assert_eq!(work.outputs.get(&funding), None);
        assert_eq!(work.tx_from, vec![format!("{}:0.00000600", sender)]);
    }

    #[test]
    fn overlay_asset_decimals_are_bounded() {
        let fixture = Fixture::new(overlay_config());
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));
        let asset = AssetDescriptor::Overlay(OverlayAsset {
            property_id: 31,
            symbol: "USDT".to_string(),
            decimals: 40,
        });

        let result =
            engine.build_transfer(&request(asset, vec![(fixture.foreign(0), Amount::from(1))]));
        assert!(matches!(
            result,
            Err(BuildError::InvalidAmount(AmountError::TooManyDecimals(40)))
        ));
        assert_eq!(fixture.ledger.queries(), 0);
    }

    #[test]
    fn overlay_sender_choice() {
        let fixture = Fixture::new(overlay_config());
        fixture.set_tokens("alice", 0, 31, 300);
        fixture.set_tokens("alice", 1, 31, 300);
        fixture.fund("alice", 0, 10_000);
        let fees = FixedRateOracle::new(Amount::from(1_000), &fixture.config);
        let codec = P2pkhCodec::new();
        let engine = TxEngine::new(&fixture.config, &codec, fixture.services(&fees));
        let to = |amount: u64| vec![(fixture.foreign_address(), Amount::from(amount))];

        assert!(matches!(
            engine.build_transfer(&request(usdt(), to(700))),
            Err(BuildError::InsufficientTokenBalance { .. })
        ));
        // enough in total but not on a single address
        assert!(matches!(
            engine.build_transfer(&request(usdt(), to(500))),
            Err(BuildError::InsufficientFees { .. })
        ));
        // alice 1 holds enough tokens but nothing to pay with
        fixture.set_tokens("alice", 1, 31, 800);
        fixture.set_tokens("alice", 0, 31, 0);
        assert!(matches!(
            engine.build_transfer(&request(usdt(), to(500))),
            Err(BuildError::InsufficientFees { .. })
        ));
    }
}
