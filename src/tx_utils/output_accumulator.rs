use crate::amount::Amount;
use serde::{Deserialize, Serialize};

/// Value outputs of a transaction keyed by address.
///
/// Paying an address twice adds to its first output instead of creating a
/// second one, and the first insertion fixes the output position.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputAmounts {
    outputs: Vec<(String, Amount)>,
}

impl OutputAmounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, address: &str, amount: Amount) {
        match self.outputs.iter_mut().find(|(addr, _)| addr == address) {
            Some((_, value)) => *value += amount,
            None => self.outputs.push((address.to_string(), amount)),
        }
    }

    pub fn get(&self, address: &str) -> Option<Amount> {
        self.outputs
            .iter()
            .find(|(addr, _)| addr == address)
            .map(|(_, amount)| *amount)
    }

    pub fn total(&self) -> Amount {
        self.outputs.iter().map(|(_, amount)| amount).sum()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Amount)> {
        self.outputs
            .iter()
            .map(|(address, amount)| (address.as_str(), *amount))
    }

    /// Moves the output of `address` to the end, keeping the order of the rest.
    pub fn move_to_end(&mut self, address: &str) {
        if let Some(position) = self.outputs.iter().position(|(addr, _)| addr == address) {
            let output = self.outputs.remove(position);
            self.outputs.push(output);
        }
    }
}

impl FromIterator<(String, Amount)> for OutputAmounts {
    fn from_iter<T: IntoIterator<Item = (String, Amount)>>(iter: T) -> Self {
        let mut outputs = OutputAmounts::new();
        for (address, amount) in iter {
            outputs.append(&address, amount);
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::tx_utils::output_accumulator::OutputAmounts;

    #[test]
    fn repeated_address_accumulates() {
        let mut outputs = OutputAmounts::new();
        outputs.append("a", Amount::from(10));
        outputs.append("b", Amount::from(5));
        outputs.append("a", Amount::from(1));
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs.get("a"), Some(Amount::from(11)));
        assert_eq!(outputs.total(), Amount::from(16));
        assert_eq!(
            outputs.iter().map(|(address, _)| address).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn move_to_end_keeps_others() {
        let mut outputs: OutputAmounts = vec![
            ("r".to_string(), Amount::from(1)),
            ("c1".to_string(), Amount::from(2)),
            ("c2".to_string(), Amount::from(3)),
        ]
        .into_iter()
        .collect();
        outputs.move_to_end("r");
        assert_eq!(
            outputs.iter().map(|(address, _)| address).collect::<Vec<_>>(),
            vec!["c1", "c2", "r"]
        );
        outputs.move_to_end("missing");
        assert_eq!(outputs.len(), 3);
    }
}
