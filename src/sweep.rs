use crate::amount::Amount;
use crate::assembler::{AssemblyPlan, PlanLayout, TransactionAssembler};
use crate::codec::TransactionCodec;
use crate::config::CoreConfig;
use crate::error::BuildError;
use crate::model::{AssetDescriptor, OverlayAsset, TransactionWork, UnspentOutput};
use crate::provider::LedgerServices;
use crate::tx_utils::output_accumulator::OutputAmounts;
use crate::tx_utils::sweep_eligibility::SweepEligibility;
use crate::tx_utils::utxo_accumulator::{source_addresses, ClaimedOutputs, UTxOAccumulator};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What to collect from which addresses of an account.
///
/// Amounts are in base units of the swept asset: `min_transfer` and
/// `retained_balance` are token units for an overlay sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepParams {
    pub account_id: String,
    pub asset: AssetDescriptor,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    pub min_transfer: Amount,
    #[serde(default)]
    pub retained_balance: Amount,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub fee_rate: Option<Amount>,
    /// Account whose outputs pay the native cost of overlay sweeps from
    /// addresses that can't afford it.
    #[serde(default)]
    pub fee_support_account: Option<String>,
    pub summary_address: String,
}

/// One sweep transaction, or the reason the addresses could not be swept.
#[derive(Debug)]
pub struct SweepUnit {
    pub source_addresses: Vec<String>,
    pub outcome: Result<TransactionWork, BuildError>,
}

/// Shared flag to stop a sweep between two addresses.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SweepBatcher<'a> {
    config: &'a CoreConfig,
    services: LedgerServices<'a>,
    assembler: TransactionAssembler<'a>,
}

impl<'a> SweepBatcher<'a> {
    pub fn new(
        config: &'a CoreConfig,
        codec: &'a dyn TransactionCodec,
        services: LedgerServices<'a>,
    ) -> Self {
        Self {
            config,
            services,
            assembler: TransactionAssembler::new(config, codec, services.address_book),
        }
    }

    /// Sweeps the account's address window into `summary_address`.
    ///
    /// Failures of single addresses or batches are reported in their unit;
    /// only invalid parameters and failures of the account wide queries end
    /// the sweep. A cancelled sweep returns the units built so far.
    pub fn sweep(
        &self,
        params: &SweepParams,
        cancel: &CancelFlag,
    ) -> Result<Vec<SweepUnit>, BuildError> {
        match &params.asset {
            AssetDescriptor::Native => self.sweep_native(params, cancel),
            AssetDescriptor::Overlay(asset) => self.sweep_overlay(params, asset, cancel),
        }
    }

    fn window(&self, params: &SweepParams) -> Result<Vec<String>, BuildError> {
        Ok(self
            .services
            .address_book
            .addresses(&params.account_id, params.start, params.limit)?
            .into_iter()
            .map(|info| info.address)
            .collect())
    }

    fn fee_rate(&self, params: &SweepParams) -> Result<Amount, BuildError> {
        match params.fee_rate {
            Some(rate) => Ok(rate),
            None => Ok(self.services.fees.estimate_fee_rate()?),
        }
    }

    fn sweep_native(
        &self,
        params: &SweepParams,
        cancel: &CancelFlag,
    ) -> Result<Vec<SweepUnit>, BuildError> {
        let addresses = self.window(params)?;
        let overlay_cost = self
            .config
            .overlay
            .enabled
            .then_some(self.config.overlay.transfer_cost);
        let mut eligibility = SweepEligibility::new(params.min_transfer, overlay_cost);

        let candidates = self
            .services
            .utxos
            .balance_of(&addresses)?
            .into_iter()
            .filter(|(_, balance)| eligibility.is_candidate(*balance))
            .collect::<Vec<_>>();
        if candidates.is_empty() {
            tracing::info!(
                "[{}] no address holds at least {}",
                params.account_id,
                params.min_transfer.fixed(self.config.decimals)
            );
            return Ok(vec![]);
        }
        let fee_rate = self.fee_rate(params)?;

        let mut units = vec![];
        let mut claimed = ClaimedOutputs::new();
        let mut batch = UTxOAccumulator::new(self.config.max_tx_inputs);
        for (address, balance) in candidates.into_iter() {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "sweep of [{}] cancelled, emitting {} pending outputs",
                    params.account_id,
                    batch.len()
                );
                break;
            }

            let outputs = match self.sweepable_outputs(&address, params, &claimed, &mut eligibility)
            {
                Ok(outputs) => outputs,
                Err(err) => {
                    units.push(SweepUnit {
                        source_addresses: vec![address],
                        outcome: Err(err),
                    });
                    continue;
                }
            };
            tracing::debug!(
                "address: {} balance: {} sweeps {} outputs",
                address,
                balance.fixed(self.config.decimals),
                outputs.len()
            );
            if let Some(pointer) = eligibility.reserved(&address) {
                tracing::debug!("address: {} keeps {}", address, pointer);
            }
            batch.add_outputs(outputs);

            while batch.is_full() {
                let inputs = batch.take_batch();
                units.extend(self.native_sweep_unit(inputs, params, fee_rate, &mut claimed));
            }
        }
        while !batch.is_empty() {
            let inputs = batch.take_batch();
            units.extend(self.native_sweep_unit(inputs, params, fee_rate, &mut claimed));
        }
        tracing::info!(
            "[{}] {} sweep transactions, {} outputs kept for overlay transfers",
            params.account_id,
            units.len(),
            eligibility.total_reserved()
        );

        Ok(units)
    }

    fn sweepable_outputs(
        &self,
        address: &str,
        params: &SweepParams,
        claimed: &ClaimedOutputs,
        eligibility: &mut SweepEligibility,
    ) -> Result<Vec<UnspentOutput>, BuildError> {
        let outputs = self
            .services
            .utxos
            .list_unspent(params.confirmations, &[address.to_string()])?
            .into_iter()
            .filter(|output| !claimed.is_claimed(output))
            .collect();
        let outputs = eligibility.keep_overlay_cost_outputs(outputs, |address| {
            self.services.overlay.holds_overlay_assets(address)
        })?;
        Ok(outputs
            .into_iter()
            .filter(|output| output.spendable)
            .collect())
    }

    /// `None` when the batch can't pay its own fee.
    fn native_sweep_unit(
        &self,
        inputs: Vec<UnspentOutput>,
        params: &SweepParams,
        fee_rate: Amount,
        claimed: &mut ClaimedOutputs,
    ) -> Option<SweepUnit> {
        let source_addresses = source_addresses(&inputs);
        let total: Amount = inputs.iter().map(|input| input.amount).sum();
        let fee = match self.services.fees.estimate_fee(inputs.len(), 1, fee_rate) {
            Ok(fee) => fee,
            Err(err) => {
                return Some(SweepUnit {
                    source_addresses,
                    outcome: Err(err.into()),
                })
            }
        };
        let swept = match total.checked_sub(fee).filter(|swept| !swept.is_zero()) {
            Some(swept) => swept,
            None => {
                tracing::info!(
                    "{} outputs of {:?} hold {}, not enough for fee {}",
                    inputs.len(),
                    source_addresses,
                    total.fixed(self.config.decimals),
                    fee.fixed(self.config.decimals)
                );
                return None;
            }
        };

        let outcome = claimed
            .claim(&inputs)
            .map_err(BuildError::from)
            .and_then(|()| {
                let mut outputs = OutputAmounts::new();
                outputs.append(&params.summary_address, swept);
                self.assembler.assemble(AssemblyPlan {
                    layout: PlanLayout::Native,
                    account_id: params.account_id.clone(),
                    inputs,
                    outputs,
                    fee,
                    fee_rate,
                })
            });
        if outcome.is_ok() {
            tracing::info!(
                "sweep {} from {:?} to {}",
                swept.fixed(self.config.decimals),
                source_addresses,
                params.summary_address
            );
        }
        Some(SweepUnit {
            source_addresses,
            outcome,
        })
    }

    fn sweep_overlay(
        &self,
        params: &SweepParams,
        asset: &OverlayAsset,
        cancel: &CancelFlag,
    ) -> Result<Vec<SweepUnit>, BuildError> {
        asset.validate()?;
        if params.min_transfer < params.retained_balance {
            return Err(BuildError::InvalidSweepParameters(format!(
                "min transfer {} is less than retained balance {}",
                params.min_transfer.fixed(asset.decimals),
                params.retained_balance.fixed(asset.decimals)
            )));
        }
        if !self.config.overlay.enabled {
            return Err(BuildError::OverlayUnsupported {
                symbol: self.config.symbol.clone(),
            });
        }

        let addresses = self.window(params)?;
        let fee_rate = self.fee_rate(params)?;
        let mut support_pool = self.fee_support_pool(params)?;

        let mut units = vec![];
        let mut claimed = ClaimedOutputs::new();
        for address in addresses.into_iter() {
            if cancel.is_cancelled() {
                tracing::warn!("sweep of [{}] cancelled", params.account_id);
                return Ok(units);
            }
            let outcome = self.overlay_sweep_address(
                &address,
                params,
                asset,
                fee_rate,
                &mut support_pool,
                &mut claimed,
            );
            match outcome {
                Ok(None) => {}
                Ok(Some(work)) => units.push(SweepUnit {
                    source_addresses: vec![address],
                    outcome: Ok(work),
                }),
                Err(err) => {
                    if err.is_insufficient_funds() {
                        tracing::info!("address: {} can't be swept: {}", address, err);
                    } else {
                        tracing::warn!("address: {} sweep failed: {}", address, err);
                    }
                    units.push(SweepUnit {
                        source_addresses: vec![address],
                        outcome: Err(err),
                    })
                }
            }
        }
        Ok(units)
    }

    /// Spendable outputs of the fee support account, smallest first.
    fn fee_support_pool(&self, params: &SweepParams) -> Result<Vec<UnspentOutput>, BuildError> {
        let account_id = match &params.fee_support_account {
            None => return Ok(vec![]),
            Some(account_id) => account_id,
        };
        let addresses = self
            .services
            .address_book
            .addresses(account_id, 0, None)?
            .into_iter()
            .map(|info| info.address)
            .collect::<Vec<_>>();
        if addresses.is_empty() {
            return Err(BuildError::AccountHasNoAddresses(account_id.clone()));
        }
        let mut pool = self
            .services
            .utxos
            .list_unspent(params.confirmations, &addresses)?
            .into_iter()
            .filter(|output| output.spendable)
            .collect::<Vec<_>>();
        pool.sort_by_key(|output| output.amount);
        Ok(pool)
    }

    fn overlay_sweep_address(
        &self,
        address: &str,
        params: &SweepParams,
        asset: &OverlayAsset,
        fee_rate: Amount,
        support_pool: &mut Vec<UnspentOutput>,
        claimed: &mut ClaimedOutputs,
    ) -> Result<Option<TransactionWork>, BuildError> {
        let token_balance = self
            .services
            .overlay
            .overlay_balance(asset.property_id, address)?;
        if token_balance.is_zero() || token_balance < params.min_transfer {
            tracing::debug!(
                "address: {} {} balance {} is below min transfer, skipped",
                address,
                asset.symbol,
                token_balance.fixed(asset.decimals)
            );
            return Ok(None);
        }
        let amount = token_balance.saturating_sub(params.retained_balance);
        if amount.is_zero() {
            tracing::debug!("address: {} keeps its whole balance, skipped", address);
            return Ok(None);
        }

        let decimals = self.config.decimals;
        let transfer_cost = self.config.overlay.transfer_cost;
        let mut inputs = self
            .services
            .utxos
            .list_unspent(params.confirmations, &[address.to_string()])?
            .into_iter()
            .filter(|output| output.spendable && !claimed.is_claimed(output))
            .collect::<Vec<_>>();
        let address_balance: Amount = inputs.iter().map(|input| input.amount).sum();
        let fee = self
            .services
            .fees
            .estimate_fee(inputs.len() + 1, 2, fee_rate)?;
        let total_cost = transfer_cost.saturating_add(fee);
        let insufficient = || BuildError::InsufficientFees {
            address: address.to_string(),
            symbol: self.config.symbol.clone(),
            available: address_balance.fixed(decimals).to_string(),
            required: total_cost.fixed(decimals).to_string(),
        };
        // the token sender is the owner of the first input, so fee support
        // can only top up an address that has native outputs of its own
        if inputs.is_empty() {
            return Err(insufficient());
        }

        let mut outputs = OutputAmounts::new();
        let mut support_used = None;
        if address_balance < total_cost {
            let shortfall = total_cost - address_balance;
            let position = support_pool
                .iter()
                .position(|output| output.amount >= shortfall && !claimed.is_claimed(output))
                .ok_or_else(insufficient)?;
            let support = support_pool[position].clone();
            tracing::info!(
                "address: {} fee support {} from {}",
                address,
                support.amount.fixed(decimals),
                support.address
            );
            let change = support.amount - shortfall;
            if !change.is_zero() {
                outputs.append(&support.address, change);
            }
            inputs.push(support);
            support_used = Some(position);
        } else {
            let change = address_balance - total_cost;
            if !change.is_zero() {
                outputs.append(&params.summary_address, change);
            }
        }
        outputs.append(&params.summary_address, transfer_cost);

        claimed.claim(&inputs)?;
        if let Some(position) = support_used {
            let pool = std::mem::take(support_pool);
            *support_pool = pool
                .into_iter()
                .enumerate()
                .filter(|(index, _)| *index != position)
                .map(|(_, output)| output)
                .collect();
        }

        tracing::info!(
            "sweep {} {} from {} to {}",
            amount.fixed(asset.decimals),
            asset.symbol,
            address,
            params.summary_address
        );
        self.assembler
            .assemble(AssemblyPlan {
                layout: PlanLayout::Overlay {
                    asset: asset.clone(),
                    recipient: params.summary_address.clone(),
                    amount,
                },
                account_id: params.account_id.clone(),
                inputs,
                outputs,
                fee,
                fee_rate,
            })
            .map(Some)
    }
}
