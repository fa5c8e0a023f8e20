pub mod balance_verification;
pub mod change_extraction;
pub mod output_accumulator;
pub mod output_utils;
pub mod sweep_eligibility;
pub mod utxo_accumulator;
