use serde::{Deserialize, Serialize};

/// Outcome of screening one address against sanctions sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionsResult {
    pub hit: bool,
    pub identifications: Vec<SanctionsIdentification>,
}

impl SanctionsResult {
    /// No hit, no identifications
    pub fn clear() -> Self {
        Self::default()
    }

    /// `hit` is set exactly when there is at least one identification
    pub fn from_identifications(identifications: Vec<SanctionsIdentification>) -> Self {
        Self {
            hit: !identifications.is_empty(),
            identifications,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanctionsIdentification {
    pub category: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SanctionsList {
    Ofac,          // US Office of Foreign Assets Control
    Eu,            // European Union
    Un,            // United Nations
    UkHmt,         // UK His Majesty's Treasury
    Local(String), // Internal watch lists
}

impl SanctionsList {
    pub fn as_str(&self) -> &str {
        match self {
            SanctionsList::Ofac => "OFAC",
            SanctionsList::Eu => "EU",
            SanctionsList::Un => "UN",
            SanctionsList::UkHmt => "UK_HMT",
            SanctionsList::Local(name) => name,
        }
    }
}

/// A sanctioned blockchain address as published on a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionsEntry {
    pub id: String,
    pub list: SanctionsList,
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

impl SanctionsEntry {
    pub fn identification(&self) -> SanctionsIdentification {
        SanctionsIdentification {
            category: "sanctions".to_string(),
            name: self.name.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
        }
    }
}
