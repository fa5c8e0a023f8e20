use crate::amount::Amount;
use crate::tx_utils::output_accumulator::OutputAmounts;

pub struct OutputsStructure {
    /// Outputs paying back into the sending account.
    pub changes: Vec<(String, Amount)>,
    /// Outputs leaving the account.
    pub fixed_outputs: Vec<(String, Amount)>,
}

impl OutputsStructure {
    pub fn sent_outside(&self) -> Amount {
        self.fixed_outputs.iter().map(|(_, amount)| amount).sum()
    }
}

pub fn extract_changes<F>(outputs: &OutputAmounts, is_own_address: F) -> OutputsStructure
where
    F: Fn(&str) -> bool,
{
    let mut changes = vec![];
    let mut fixed_outputs = vec![];

    for (address, amount) in outputs.iter() {
        if is_own_address(address) {
            changes.push((address.to_string(), amount));
        } else {
            fixed_outputs.push((address.to_string(), amount));
        }
    }

    OutputsStructure {
        changes,
        fixed_outputs,
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::tx_utils::change_extraction::extract_changes;
    use crate::tx_utils::output_accumulator::OutputAmounts;

    #[test]
    fn check_split_changes() {
        let mut outputs = OutputAmounts::new();
        outputs.append("external-1", Amount::from(3));
        outputs.append("own-1", Amount::from(1));
        outputs.append("external-2", Amount::from(4));
        outputs.append("own-2", Amount::from(2));

        let result = extract_changes(&outputs, |address| address.starts_with("own"));
        assert_eq!(
            result.changes,
            vec![
                ("own-1".to_string(), Amount::from(1)),
                ("own-2".to_string(), Amount::from(2))
            ]
        );
        assert_eq!(
            result.fixed_outputs,
            vec![
                ("external-1".to_string(), Amount::from(3)),
                ("external-2".to_string(), Amount::from(4))
            ]
        );
        assert_eq!(result.sent_outside(), Amount::from(7));
    }

    #[test]
    fn check_split_no_change() {
        let mut outputs = OutputAmounts::new();
        outputs.append("external", Amount::from(3));
        let result = extract_changes(&outputs, |_| false);
        assert!(result.changes.is_empty());
        assert_eq!(result.fixed_outputs.len(), 1);
    }
}
