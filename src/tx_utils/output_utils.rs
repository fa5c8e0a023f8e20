use crate::amount::Amount;
use crate::codec::{OverlayPayload, TxInputRef, TxOutputSpec};
use crate::model::UnspentOutput;
use crate::tx_utils::output_accumulator::OutputAmounts;

pub fn utxos_to_input_refs(outputs: &[UnspentOutput]) -> Vec<TxInputRef> {
    outputs
        .iter()
        .map(|utxo| TxInputRef {
            tx_id: utxo.tx_id.clone(),
            vout: utxo.vout,
            locking_script: utxo.locking_script.clone(),
            amount: utxo.amount,
        })
        .collect::<Vec<_>>()
}

/// Output layout handed to the codec: the overlay marker first, then the
/// value outputs in their accumulated order.
pub fn output_specs(outputs: &OutputAmounts, marker: Option<OverlayPayload>) -> Vec<TxOutputSpec> {
    marker
        .map(TxOutputSpec::OverlayMarker)
        .into_iter()
        .chain(outputs.iter().map(|(address, value)| TxOutputSpec::Payment {
            address: address.to_string(),
            value,
        }))
        .collect()
}

/// `address:amount` records of the spent outputs.
pub fn tx_from_records(inputs: &[UnspentOutput], decimals: u32) -> Vec<String> {
    inputs
        .iter()
        .map(|utxo| format!("{}:{}", utxo.address, utxo.amount.fixed(decimals)))
        .collect()
}

pub fn tx_to_records(outputs: &OutputAmounts, decimals: u32) -> Vec<String> {
    outputs
        .iter()
        .map(|(address, amount)| format!("{}:{}", address, amount.fixed(decimals)))
        .collect()
}

pub fn transfer_record(address: &str, amount: Amount, decimals: u32) -> String {
    format!("{}:{}", address, amount.fixed(decimals))
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::codec::{OverlayPayload, TxOutputSpec};
    use crate::tx_utils::output_accumulator::OutputAmounts;
    use crate::tx_utils::output_utils::{output_specs, tx_to_records};

    #[test]
    fn marker_goes_first() {
        let mut outputs = OutputAmounts::new();
        outputs.append("change", Amount::from(10));
        outputs.append("receiver", Amount::from(546));
        let specs = output_specs(&outputs, Some(OverlayPayload::simple_send(1, 5)));
        assert_eq!(specs.len(), 3);
        assert!(matches!(specs[0], TxOutputSpec::OverlayMarker(_)));
        assert_eq!(
            specs[2],
            TxOutputSpec::Payment {
                address: "receiver".to_string(),
                value: Amount::from(546)
            }
        );
        assert_eq!(output_specs(&outputs, None).len(), 2);
    }

    #[test]
    fn records_use_asset_decimals() {
        let mut outputs = OutputAmounts::new();
        outputs.append("receiver", Amount::from(250_000_000));
        assert_eq!(
            tx_to_records(&outputs, 8),
            vec!["receiver:2.50000000".to_string()]
        );
    }
}
