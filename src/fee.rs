use crate::amount::Amount;
use crate::config::CoreConfig;
use crate::provider::FeeOracle;

/// Fee from the estimated serialized size of a P2PKH transaction.
#[derive(Clone, Debug)]
pub struct SizeFeeModel {
    input_size: u64,
    output_size: u64,
    overhead_size: u64,
    max_tx_inputs: usize,
    min_fees: Amount,
}

impl SizeFeeModel {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            input_size: config.fee_model.input_size,
            output_size: config.fee_model.output_size,
            overhead_size: config.fee_model.overhead_size,
            max_tx_inputs: config.max_tx_inputs.max(1),
            min_fees: config.min_fees,
        }
    }

    /// Estimated size in bytes. Inputs beyond the per-transaction ceiling are
    /// charged one overhead per transaction they would be split into.
    pub fn size(&self, inputs: usize, outputs: usize) -> u64 {
        let pieces = ((inputs + self.max_tx_inputs - 1) / self.max_tx_inputs).max(1) as u64;
        self.input_size * inputs as u64
            + self.output_size * outputs as u64
            + self.overhead_size * pieces
    }

    /// `rate` is per 1000 bytes; the result rounds half up.
    pub fn fee(&self, inputs: usize, outputs: usize, rate: Amount) -> Amount {
        let size = self.size(inputs, outputs) as u128;
        let fee = (size * rate.units() as u128 + 500) / 1000;
        let fee = Amount::from_units(u64::try_from(fee).unwrap_or(u64::MAX));
        fee.max(self.min_fees)
    }
}

/// Oracle answering with a configured rate.
#[derive(Clone, Debug)]
pub struct FixedRateOracle {
    rate: Amount,
    model: SizeFeeModel,
}

impl FixedRateOracle {
    pub fn new(rate: Amount, config: &CoreConfig) -> Self {
        Self {
            rate,
            model: SizeFeeModel::from_config(config),
        }
    }
}

impl FeeOracle for FixedRateOracle {
    fn estimate_fee_rate(&self) -> anyhow::Result<Amount> {
        Ok(self.rate)
    }

    fn estimate_fee(&self, inputs: usize, outputs: usize, rate: Amount) -> anyhow::Result<Amount> {
        Ok(self.model.fee(inputs, outputs, rate))
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::config::CoreConfig;
    use crate::fee::{FixedRateOracle, SizeFeeModel};
    use crate::provider::FeeOracle;

    #[test]
    fn size_of_simple_transfer() {
        let model = SizeFeeModel::from_config(&CoreConfig::default());
        assert_eq!(model.size(1, 2), 148 + 68 + 10);
        assert_eq!(model.size(0, 1), 34 + 10);
    }

    #[test]
    fn pieces_follow_input_ceiling() {
        let config = CoreConfig {
            max_tx_inputs: 2,
            ..Default::default()
        };
        let model = SizeFeeModel::from_config(&config);
        assert_eq!(model.size(5, 1), 148 * 5 + 34 + 30);
    }

    #[test]
    fn fee_rounds_and_respects_minimum() {
        let mut config = CoreConfig::default();
        let model = SizeFeeModel::from_config(&config);
        // 226 bytes at 1000 units per kB
        assert_eq!(model.fee(1, 2, Amount::from(1000)), Amount::from(226));
        // 226 * 3 / 1000 = 0.678
        assert_eq!(model.fee(1, 2, Amount::from(3)), Amount::from(1));

        config.min_fees = Amount::from(500);
        let oracle = FixedRateOracle::new(Amount::from(1000), &config);
        let rate = oracle.estimate_fee_rate().unwrap();
        assert_eq!(oracle.estimate_fee(1, 2, rate).unwrap(), Amount::from(500));
    }
}
