//! Core types for risk engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Risk score (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(u8);

impl RiskScore {
    /// Create new risk score, clamped to 0-100
    pub fn new(score: u8) -> Self {
        Self(score.min(100))
    }

    /// Clamp an arbitrary provider value into 0-100
    pub fn clamped(score: i64) -> Self {
        Self(score.clamp(0, 100) as u8)
    }

    /// Get raw score
    pub fn score(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score below 30
    Low,
    /// Score 30-59
    Medium,
    /// Score 60-79
    High,
    /// Score 80 and above
    Critical,
}

impl RiskLevel {
    /// Label used on the wire and in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }
}

impl From<RiskScore> for RiskLevel {
    fn from(score: RiskScore) -> Self {
        match score.score() {
            80.. => RiskLevel::Critical,
            60..=79 => RiskLevel::High,
            30..=59 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" | "severe" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Risk assessment result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Risk score
    pub risk_score: RiskScore,

    /// Risk level
    pub risk_level: RiskLevel,

    /// Risk categories detected
    pub categories: Vec<String>,
}

impl RiskAssessment {
    /// Assessment whose level is derived from the score
    pub fn from_score(score: RiskScore, categories: Vec<String>) -> Self {
        Self {
            risk_score: score,
            risk_level: RiskLevel::from(score),
            categories,
        }
    }
}
