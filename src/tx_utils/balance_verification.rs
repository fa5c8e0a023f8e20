use crate::amount::{Amount, Balance};
use crate::model::UnspentOutput;
use crate::tx_utils::output_accumulator::OutputAmounts;
use anyhow::anyhow;
use itertools::Itertools;

/// Checks that inputs pay exactly for outputs plus fee and that no output
/// is spent twice.
pub fn verify_io_balance(
    inputs: &[UnspentOutput],
    outputs: &OutputAmounts,
    fee: &Amount,
) -> anyhow::Result<()> {
    if !inputs.iter().map(UnspentOutput::pointer).all_unique() {
        return Err(anyhow!("found non unique input: {:?}", inputs));
    }

    let mut balance = Balance::zero();
    for input in inputs.iter() {
        balance += &input.amount;
    }
    for (address, amount) in outputs.iter() {
        if amount.is_zero() {
            return Err(anyhow!("output to {} has no value", address));
        }
        balance -= &amount;
    }

    balance -= fee;
    if !balance.balanced() {
        return Err(anyhow!("main asset is not balanced: balance {}", balance));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::model::UnspentOutput;
    use crate::tx_utils::balance_verification::verify_io_balance;
    use crate::tx_utils::output_accumulator::OutputAmounts;

    fn input(vout: u32, amount: u64) -> UnspentOutput {
        UnspentOutput {
            tx_id: "00".repeat(32),
            vout,
            address: "sender".to_string(),
            amount: Amount::from(amount),
            locking_script: String::new(),
            spendable: true,
            confirmations: 1,
        }
    }

    fn correct_outputs() -> OutputAmounts {
        vec![
            ("receiver".to_string(), Amount::from(100)),
            ("sender".to_string(), Amount::from(10)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn verify_correct() {
        let inputs = vec![input(0, 60), input(1, 51)];
        assert!(verify_io_balance(&inputs, &correct_outputs(), &Amount::from(1)).is_ok());
    }

    #[test]
    fn verify_incorrect_double_input() {
        let inputs = vec![input(0, 60), input(0, 51)];
        let result = verify_io_balance(&inputs, &correct_outputs(), &Amount::from(1));
        let error_string = result.err().unwrap().to_string();
        assert!(error_string.starts_with("found non unique input"));
    }

    #[test]
    fn verify_incorrect_main_balance() {
        let inputs = vec![input(0, 60), input(1, 50)];
        let result = verify_io_balance(&inputs, &correct_outputs(), &Amount::from(1));
        let error_string = result.err().unwrap().to_string();
        assert!(
            error_string.starts_with("main asset is not balanced: balance -1"),
            "{}",
            error_string
        );
    }

    #[test]
    fn verify_zero_output() {
        let inputs = vec![input(0, 11)];
        let mut outputs = OutputAmounts::new();
        outputs.append("receiver", Amount::from(10));
        outputs.append("sender", Amount::ZERO);
        let result = verify_io_balance(&inputs, &outputs, &Amount::from(1));
        assert!(result.is_err());
    }
}
