//! Supported assets and their address rules

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

lazy_static! {
    static ref BTC_LEGACY: Regex = Regex::new(r"^[13][a-km-zA-HJ-NP-Z1-9]{25,34}$").unwrap();
    static ref BTC_BECH32: Regex = Regex::new(r"^bc1[a-z0-9]{39,59}$").unwrap();
    static ref EVM_ADDRESS: Regex = Regex::new(r"^0x[a-fA-F0-9]{40}$").unwrap();
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Invalid {currency} address: {address}")]
    InvalidAddress { currency: String, address: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    Bitcoin,
    Ethereum,
    Usdt,
}

impl Asset {
    pub const ALL: [Asset; 3] = [Asset::Bitcoin, Asset::Ethereum, Asset::Usdt];

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Bitcoin => "BTC",
            Asset::Ethereum => "ETH",
            Asset::Usdt => "USDT",
        }
    }

    pub fn chain(&self) -> &'static str {
        match self {
            Asset::Bitcoin => "bitcoin",
            Asset::Ethereum | Asset::Usdt => "ethereum",
        }
    }

    /// Canonical form of an address; hex addresses are case-insensitive
    pub fn normalize(&self, address: &str) -> String {
        match self {
            Asset::Bitcoin => address.trim().to_string(),
            Asset::Ethereum | Asset::Usdt => address.trim().to_lowercase(),
        }
    }

    pub fn validate(&self, address: &str) -> Result<(), AssetError> {
        let valid = match self {
            Asset::Bitcoin => {
                BTC_LEGACY.is_match(address)
                    || ((42..=62).contains(&address.len()) && BTC_BECH32.is_match(address))
            }
            Asset::Ethereum | Asset::Usdt => EVM_ADDRESS.is_match(address),
        };

        if valid {
            Ok(())
        } else {
            Err(AssetError::InvalidAddress {
                currency: self.symbol().to_string(),
                address: address.to_string(),
            })
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Assets accepted by intake, looked up by case-insensitive symbol
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    assets: HashMap<&'static str, Asset>,
}

impl AssetRegistry {
    pub fn with_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        Self {
            assets: assets.into_iter().map(|a| (a.symbol(), a)).collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Result<Asset, AssetError> {
        let symbol = symbol.trim().to_uppercase();
        self.assets
            .get(symbol.as_str())
            .copied()
            .ok_or(AssetError::UnsupportedCurrency(symbol))
    }

    pub fn list(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.assets.values().copied().collect();
        assets.sort_by_key(|a| a.symbol());
        assets
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::with_assets(Asset::ALL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = AssetRegistry::default();
        assert_eq!(registry.get("eth").unwrap(), Asset::Ethereum);
        assert_eq!(registry.get(" Usdt ").unwrap(), Asset::Usdt);
        assert_eq!(
            registry.get("xrp"),
            Err(AssetError::UnsupportedCurrency("XRP".to_string()))
        );
    }

    #[test]
    fn test_restricted_registry() {
        let registry = AssetRegistry::with_assets([Asset::Bitcoin]);
        assert!(registry.get("BTC").is_ok());
        assert!(registry.get("ETH").is_err());
        assert_eq!(registry.list(), vec![Asset::Bitcoin]);
    }

    #[test]
    fn test_bitcoin_addresses() {
        let btc = Asset::Bitcoin;
        assert!(btc.validate("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa").is_ok());
        assert!(btc.validate("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").is_ok());
        assert!(btc.validate("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_ok());
        assert!(btc.validate("0x742d35cc6634c0532925a3b844bc454e4438f44e").is_err());
        // 0, O, I and l are not base58
        assert!(btc.validate("1A1zP1eP5QGefi2DMPTfTL5SLmv7Divf0O").is_err());
        assert_eq!(btc.normalize("  1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa "), "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
    }

    #[test]
    fn test_evm_addresses() {
        let address = Asset::Ethereum.normalize(" 0x742D35CC6634C0532925A3B844BC454E4438F44E ");
        assert_eq!(address, "0x742d35cc6634c0532925a3b844bc454e4438f44e");
        assert!(Asset::Ethereum.validate(&address).is_ok());
        assert!(Asset::Usdt.validate(&address).is_ok());
        assert!(Asset::Ethereum.validate("0x742d35cc").is_err());
        assert!(Asset::Ethereum.validate("742d35cc6634c0532925a3b844bc454e4438f44e00").is_err());
        assert_eq!(Asset::Usdt.chain(), "ethereum");
    }
}
