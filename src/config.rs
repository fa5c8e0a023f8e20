use crate::amount::{check_decimals, Amount};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Testnet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveType {
    Secp256k1,
}

/// Version bytes of base58check addresses on one network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressPrefix {
    pub p2pkh: u8,
    pub p2sh: u8,
}

impl AddressPrefix {
    pub const MAINNET: AddressPrefix = AddressPrefix {
        p2pkh: 0x00,
        p2sh: 0x05,
    };
    pub const TESTNET: AddressPrefix = AddressPrefix {
        p2pkh: 0x6f,
        p2sh: 0xc4,
    };
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayConfig {
    pub enabled: bool,
    /// Native value carried to the token recipient by every overlay transfer.
    pub transfer_cost: Amount,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transfer_cost: Amount::from_units(546),
        }
    }
}

/// Serialized size estimates used by [`crate::fee::SizeFeeModel`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeModelConfig {
    pub input_size: u64,
    pub output_size: u64,
    pub overhead_size: u64,
}

impl Default for FeeModelConfig {
    fn default() -> Self {
        Self {
            input_size: 148,
            output_size: 34,
            overhead_size: 10,
        }
    }
}

/// Immutable settings threaded into every engine call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CoreConfig {
    pub symbol: String,
    pub decimals: u32,
    pub curve: CurveType,
    pub network: Network,
    pub mainnet_prefix: AddressPrefix,
    pub testnet_prefix: AddressPrefix,
    pub max_tx_inputs: usize,
    pub min_fees: Amount,
    pub fee_model: FeeModelConfig,
    pub overlay: OverlayConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            symbol: "ILC".to_string(),
            decimals: 8,
            curve: CurveType::Secp256k1,
            network: Network::Testnet,
            mainnet_prefix: AddressPrefix::MAINNET,
            testnet_prefix: AddressPrefix::TESTNET,
            max_tx_inputs: 150,
            min_fees: Amount::ZERO,
            fee_model: Default::default(),
            overlay: Default::default(),
        }
    }
}

impl CoreConfig {
    pub fn address_prefix(&self) -> AddressPrefix {
        match self.network {
            Network::Mainnet => self.mainnet_prefix,
            Network::Testnet => self.testnet_prefix,
        }
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| {
            format!("Cannot read config file {path}", path = path.display())
        })?;
        let config: CoreConfig = serde_yaml::from_reader(file).with_context(|| {
            format!("Cannot parse config file {path}", path = path.display())
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_tx_inputs == 0 {
            anyhow::bail!("max_tx_inputs must be positive");
        }
        check_decimals(self.decimals)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::amount::Amount;
    use crate::config::{AddressPrefix, CoreConfig, Network};

    #[test]
    fn prefix_follows_explicit_network() {
        let mut config = CoreConfig::default();
        assert_eq!(config.address_prefix(), AddressPrefix::TESTNET);
        config.network = Network::Mainnet;
        assert_eq!(config.address_prefix(), AddressPrefix::MAINNET);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config: CoreConfig = serde_yaml::from_str(
            "
            symbol: BTC
            network: mainnet
            max_tx_inputs: 10
            overlay:
              enabled: true
              transfer_cost: 546
            ",
        )
        .unwrap();
        assert_eq!(config.symbol, "BTC");
        assert_eq!(config.decimals, 8);
        assert_eq!(config.max_tx_inputs, 10);
        assert!(config.overlay.enabled);
        assert_eq!(config.overlay.transfer_cost, Amount::from_units(546));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<CoreConfig, _> = serde_yaml::from_str("rpc_user: admin");
        assert!(result.is_err());
    }
}
