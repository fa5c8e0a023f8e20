use crate::amount::Amount;
use crate::model::{OutputPointer, UnspentOutput};
use std::collections::HashMap;

/// Decides which addresses and outputs a native sweep may touch.
pub struct SweepEligibility {
    min_transfer: Amount,
    overlay_cost: Option<Amount>,
    reserved: HashMap<String, OutputPointer>,
    overlay_holders: HashMap<String, bool>,
}

impl SweepEligibility {
    /// `overlay_cost` is the transfer cost to keep aside per address, `None`
    /// when the overlay layer is disabled.
    pub fn new(min_transfer: Amount, overlay_cost: Option<Amount>) -> Self {
        Self {
            min_transfer,
            overlay_cost,
            reserved: Default::default(),
            overlay_holders: Default::default(),
        }
    }

    pub fn is_candidate(&self, balance: Amount) -> bool {
        balance >= self.min_transfer
    }

    /// Drops one output no larger than the overlay transfer cost per address
    /// whenever the address holds overlay assets or the output is unconfirmed,
    /// so a later overlay sweep can still pay for itself.
    pub fn keep_overlay_cost_outputs<F>(
        &mut self,
        outputs: Vec<UnspentOutput>,
        mut holds_overlay_assets: F,
    ) -> anyhow::Result<Vec<UnspentOutput>>
    where
        F: FnMut(&str) -> anyhow::Result<bool>,
    {
        let transfer_cost = match self.overlay_cost {
            None => return Ok(outputs),
            Some(cost) => cost,
        };

        let mut result = vec![];
        for output in outputs.into_iter() {
            let holds = match self.overlay_holders.get(&output.address) {
                Some(holds) => *holds,
                None => {
                    let holds = holds_overlay_assets(&output.address)?;
                    self.overlay_holders.insert(output.address.clone(), holds);
                    holds
                }
            };
            if (holds || output.confirmations == 0)
                && output.amount <= transfer_cost
                && !self.reserved.contains_key(&output.address)
            {
                tracing::debug!(
                    "address: {} should keep a utxo for overlay transfer cost",
                    output.address
                );
                self.reserved
                    .insert(output.address.clone(), output.pointer());
                continue;
            }
            result.push(output);
        }
        Ok(result)
    }

    pub fn reserved(&self, address: &str) -> Option<&OutputPointer> {
        self.reserved.get(address)
    }

    pub fn total_reserved(&self) -> usize {
        self.reserved.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::model::UnspentOutput;
    use crate::tx_utils::sweep_eligibility::SweepEligibility;

    fn utxo(vout: u32, address: &str, amount: u64, confirmations: u64) -> UnspentOutput {
        UnspentOutput {
            tx_id: format!("{:064x}", 9),
            vout,
            address: address.to_string(),
            amount: Amount::from(amount),
            locking_script: String::new(),
            spendable: true,
            confirmations,
        }
    }

    #[test]
    fn min_transfer_threshold() {
        let criteria = SweepEligibility::new(Amount::from(10), None);
        assert!(criteria.is_candidate(Amount::from(10)));
        assert!(!criteria.is_candidate(Amount::from(9)));
    }

    #[test]
    fn disabled_overlay_keeps_everything() {
        let mut criteria = SweepEligibility::new(Amount::ZERO, None);
        let outputs = vec![utxo(0, "a", 1, 0), utxo(1, "a", 2, 0)];
        let result = criteria
            .keep_overlay_cost_outputs(outputs, |_| Ok(true))
            .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(criteria.total_reserved(), 0);
    }

    #[test]
    fn one_cost_output_reserved_per_holder() {
        let mut criteria = SweepEligibility::new(Amount::ZERO, Some(Amount::from(546)));
        let outputs = vec![
            utxo(0, "holder", 1000, 3),
            utxo(1, "holder", 546, 3),
            utxo(2, "holder", 500, 3),
            utxo(3, "plain", 500, 3),
            utxo(4, "plain", 400, 0),
            utxo(5, "plain", 300, 0),
        ];
        let result = criteria
            .keep_overlay_cost_outputs(outputs, |address| Ok(address == "holder"))
            .unwrap();
        assert_eq!(
            result.iter().map(|utxo| utxo.vout).collect::<Vec<_>>(),
            vec![0, 2, 3, 5]
        );
        assert_eq!(criteria.reserved("holder").unwrap().vout, 1);
        assert_eq!(criteria.reserved("plain").unwrap().vout, 4);
    }
}
