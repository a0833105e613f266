use crate::error::{ComplianceError, Result};
use crate::types::{SanctionsEntry, SanctionsList, SanctionsResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Screens a blockchain address against sanctions sources
#[async_trait]
pub trait SanctionsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn check_address(&self, address: &str) -> Result<SanctionsResult>;
}

/// SanctionsEngine keeps sanctioned addresses in memory for fast lookup
pub struct SanctionsEngine {
    // Map: list_name -> (normalized address -> entries)
    lists: Arc<DashMap<String, DashMap<String, Vec<SanctionsEntry>>>>,
}

impl SanctionsEngine {
    pub fn new() -> Self {
        Self {
            lists: Arc::new(DashMap::new()),
        }
    }

    /// Load (or replace) a sanctions list
    pub fn load_list(&self, list: SanctionsList, entries: Vec<SanctionsEntry>) -> Result<()> {
        let list_name = list.as_str().to_string();
        let map: DashMap<String, Vec<SanctionsEntry>> = DashMap::new();

        for entry in entries {
            if entry.address.trim().is_empty() {
                return Err(ComplianceError::InvalidInput(format!(
                    "entry {} in {} has no address",
                    entry.id, list_name
                )));
            }
            map.entry(Self::normalize_address(&entry.address))
                .or_default()
                .push(entry);
        }

        let count = map.len();
        self.lists.insert(list_name.clone(), map);
        info!("Loaded {} sanctions list with {} addresses", list_name, count);

        Ok(())
    }

    pub fn list_count(&self) -> usize {
        self.lists.len()
    }

    pub fn address_count(&self) -> usize {
        self.lists.iter().map(|list| list.value().len()).sum()
    }

    /// Look an address up across every loaded list
    pub fn check(&self, address: &str) -> SanctionsResult {
        let key = Self::normalize_address(address);
        let mut identifications = Vec::new();

        for list in self.lists.iter() {
            if let Some(entries) = list.value().get(&key) {
                debug!("Sanctions match found in {} for {}", list.key(), address);
                identifications.extend(entries.iter().map(SanctionsEntry::identification));
            }
        }

        SanctionsResult::from_identifications(identifications)
    }

    /// Hex addresses are case-insensitive; base58 and bech32 are kept as-is
    fn normalize_address(address: &str) -> String {
        let trimmed = address.trim();
        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        }
    }
}

impl Default for SanctionsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SanctionsProvider for SanctionsEngine {
    fn name(&self) -> &str {
        "sanctions-engine"
    }

    async fn check_address(&self, address: &str) -> Result<SanctionsResult> {
        Ok(self.check(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, address: &str, name: &str) -> SanctionsEntry {
        SanctionsEntry {
            id: id.to_string(),
            list: SanctionsList::Ofac,
            address: address.to_string(),
            name: name.to_string(),
            description: String::new(),
            url: "https://example.org/sdn".to_string(),
        }
    }

    #[test]
    fn test_hit_and_miss() {
        let engine = SanctionsEngine::new();
        engine
            .load_list(
                SanctionsList::Ofac,
                vec![entry("1", "0x8589427373D6D84E98730D7795D8f6f8731FDA16", "Mixer Co")],
            )
            .unwrap();

        let hit = engine.check("0x8589427373d6d84e98730d7795d8f6f8731fda16");
        assert!(hit.hit);
        assert_eq!(hit.identifications.len(), 1);
        assert_eq!(hit.identifications[0].name, "Mixer Co");
        assert_eq!(hit.identifications[0].category, "sanctions");

        let miss = engine.check("0x0000000000000000000000000000000000000000");
        assert_eq!(miss, SanctionsResult::clear());
    }

    #[test]
    fn test_matches_across_lists() {
        let engine = SanctionsEngine::new();
        let address = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";
        engine
            .load_list(SanctionsList::Ofac, vec![entry("1", address, "A")])
            .unwrap();
        engine
            .load_list(SanctionsList::Eu, vec![entry("2", address, "B")])
            .unwrap();

        assert_eq!(engine.list_count(), 2);
        assert_eq!(engine.address_count(), 2);
        assert_eq!(engine.check(address).identifications.len(), 2);
        // base58 is case-sensitive
        assert!(!engine.check(&address.to_lowercase()).hit);
    }

    #[test]
    fn test_rejects_entry_without_address() {
        let engine = SanctionsEngine::new();
        assert!(engine
            .load_list(SanctionsList::Un, vec![entry("1", "  ", "X")])
            .is_err());
    }

    #[tokio::test]
    async fn test_provider_interface() {
        let engine = SanctionsEngine::new();
        let result = engine.check_address("bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh").await;
        assert_eq!(result.unwrap(), SanctionsResult::clear());
    }
}
