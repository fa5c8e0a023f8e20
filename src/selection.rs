use crate::amount::Amount;
use crate::model::UnspentOutput;
use crate::provider::FeeOracle;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub chosen: Vec<UnspentOutput>,
    pub fee: Amount,
    /// Sum of the chosen outputs.
    pub balance: Amount,
    pub iterations: usize,
}

impl Selection {
    /// What is left after paying `target` and the fee.
    pub fn change(&self, target: Amount) -> Amount {
        self.balance.saturating_sub(target.saturating_add(self.fee))
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("balance {available} is not enough, {required} required")]
    Insufficient { available: Amount, required: Amount },
    #[error("spendable balance {spendable} is not enough, {required} required")]
    InsufficientSpendable { spendable: Amount, required: Amount },
    #[error("selection uses {count} inputs, more than {max}")]
    TooManyInputs { count: usize, max: usize },
    #[error(transparent)]
    Fee(#[from] anyhow::Error),
}

/// Smallest-first coin selection with a fee that depends on the selection.
pub struct CoinSelector<'a> {
    fees: &'a dyn FeeOracle,
    max_tx_inputs: usize,
}

impl<'a> CoinSelector<'a> {
    pub fn new(fees: &'a dyn FeeOracle, max_tx_inputs: usize) -> Self {
        Self {
            fees,
            max_tx_inputs,
        }
    }

    /// Sorts `available` ascending by amount, keeping the order of equal
    /// amounts, and selects from it.
    pub fn select<F>(
        &self,
        available: &[UnspentOutput],
        target: Amount,
        fee_rate: Amount,
        output_count: F,
    ) -> Result<Selection, SelectionError>
    where
        F: Fn(&[UnspentOutput]) -> usize,
    {
        let mut ordered = available.to_vec();
        ordered.sort_by_key(|utxo| utxo.amount);
        self.select_ordered(&ordered, target, fee_rate, output_count)
    }

    /// Selects from `ordered` as given.
    ///
    /// The fee depends on how many inputs are used, so the scan restarts
    /// with `target + fee` until the chosen prefix pays for itself. Every
    /// restart picks a strictly longer prefix, which bounds the iterations
    /// by the number of outputs.
    pub fn select_ordered<F>(
        &self,
        ordered: &[UnspentOutput],
        target: Amount,
        fee_rate: Amount,
        output_count: F,
    ) -> Result<Selection, SelectionError>
    where
        F: Fn(&[UnspentOutput]) -> usize,
    {
        let mut required = target;
        let mut iterations = 0;

        loop {
            let mut chosen = vec![];
            let mut balance = Amount::ZERO;
            for utxo in ordered.iter().filter(|utxo| utxo.spendable) {
                balance = balance.saturating_add(utxo.amount);
                chosen.push(utxo.clone());
                if balance >= required {
                    break;
                }
            }

            if balance < required {
                let total = ordered
                    .iter()
                    .fold(Amount::ZERO, |total, utxo| total.saturating_add(utxo.amount));
                return Err(if total >= required {
                    SelectionError::InsufficientSpendable {
                        spendable: balance,
                        required,
                    }
                } else {
                    SelectionError::Insufficient {
                        available: total,
                        required,
                    }
                });
            }

            iterations += 1;
            let fee = self
                .fees
                .estimate_fee(chosen.len(), output_count(&chosen), fee_rate)?;
            tracing::debug!(
                "selection iteration {}: {} inputs, balance {}, fee {}",
                iterations,
                chosen.len(),
                balance,
                fee
            );

            // a saturated requirement can't be met and ends in a shortfall
            let with_fee = target.saturating_add(fee);
            if with_fee > balance {
                required = with_fee;
                continue;
            }

            if chosen.len() > self.max_tx_inputs {
                return Err(SelectionError::TooManyInputs {
                    count: chosen.len(),
                    max: self.max_tx_inputs,
                });
            }

            return Ok(Selection {
                chosen,
                fee,
                balance,
                iterations,
            });
        }
    }
}
