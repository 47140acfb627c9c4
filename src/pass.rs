//! Pass definitions and catalog loading.
//!
//! This module provides:
//! - `PassKey`, the closed set of pass identifiers a job can track
//! - `PassDefinition`, one display-only entry of the catalog
//! - `PassCatalog`, the versioned, ordered list of passes with JSON loading
//! - The default 10-pass catalog used when no override file exists

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Fewest passes a pipeline may be configured with.
pub const MIN_PASSES: u32 = 8;
/// Most passes a pipeline may be configured with.
pub const MAX_PASSES: u32 = 10;

/// Identifier of a pass slot. Serialized as `pass_1` … `pass_10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PassKey {
    #[serde(rename = "pass_1")]
    Pass1,
    #[serde(rename = "pass_2")]
    Pass2,
    #[serde(rename = "pass_3")]
    Pass3,
    #[serde(rename = "pass_4")]
    Pass4,
    #[serde(rename = "pass_5")]
    Pass5,
    #[serde(rename = "pass_6")]
    Pass6,
    #[serde(rename = "pass_7")]
    Pass7,
    #[serde(rename = "pass_8")]
    Pass8,
    #[serde(rename = "pass_9")]
    Pass9,
    #[serde(rename = "pass_10")]
    Pass10,
}

impl PassKey {
    pub const ALL: [PassKey; 10] = [
        Self::Pass1,
        Self::Pass2,
        Self::Pass3,
        Self::Pass4,
        Self::Pass5,
        Self::Pass6,
        Self::Pass7,
        Self::Pass8,
        Self::Pass9,
        Self::Pass10,
    ];

    /// Key for a 1-based pass number, if it is in range.
    pub fn from_number(number: u32) -> Option<Self> {
        let idx = usize::try_from(number).ok()?.checked_sub(1)?;
        Self::ALL.get(idx).copied()
    }

    pub fn number(self) -> u32 {
        match self {
            Self::Pass1 => 1,
            Self::Pass2 => 2,
            Self::Pass3 => 3,
            Self::Pass4 => 4,
            Self::Pass5 => 5,
            Self::Pass6 => 6,
            Self::Pass7 => 7,
            Self::Pass8 => 8,
            Self::Pass9 => 9,
            Self::Pass10 => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass1 => "pass_1",
            Self::Pass2 => "pass_2",
            Self::Pass3 => "pass_3",
            Self::Pass4 => "pass_4",
            Self::Pass5 => "pass_5",
            Self::Pass6 => "pass_6",
            Self::Pass7 => "pass_7",
            Self::Pass8 => "pass_8",
            Self::Pass9 => "pass_9",
            Self::Pass10 => "pass_10",
        }
    }
}

impl fmt::Display for PassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("pass_")
            .and_then(|n| n.parse::<u32>().ok())
            .and_then(Self::from_number)
            .ok_or_else(|| format!("Invalid pass key: {}", s))
    }
}

/// One entry in the pass catalog. Display-only: pipeline logic keys off
/// `number` and `key`, never the label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassDefinition {
    pub number: u32,
    pub key: PassKey,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

impl PassDefinition {
    pub fn new(key: PassKey, label: &str, description: &str) -> Self {
        Self {
            number: key.number(),
            key,
            label: label.to_string(),
            description: description.to_string(),
        }
    }
}

/// Ordered, versioned list of passes. Loaded once and shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassCatalog {
    /// Bumped whenever labels or the pass list change.
    pub version: u32,
    pub passes: Vec<PassDefinition>,
}

impl Default for PassCatalog {
    fn default() -> Self {
        let passes = vec![
            PassDefinition::new(PassKey::Pass1, "Draft Generation", "Write the first full draft from the brief"),
            PassDefinition::new(PassKey::Pass2, "Header Optimization", "Tighten heading hierarchy and wording"),
            PassDefinition::new(PassKey::Pass3, "Lists & Tables", "Convert dense prose into lists and tables where it reads better"),
            PassDefinition::new(PassKey::Pass4, "Visual Semantics", "Place and describe images for each section"),
            PassDefinition::new(PassKey::Pass5, "Micro Semantics", "Sentence-level precision and terminology"),
            PassDefinition::new(PassKey::Pass6, "Discourse Integration", "Smooth transitions between sections"),
            PassDefinition::new(PassKey::Pass7, "Introduction Synthesis", "Rewrite the introduction against the finished body"),
            PassDefinition::new(PassKey::Pass8, "Final Polish", "Style, tone and brand consistency"),
            PassDefinition::new(PassKey::Pass9, "Quality Audit", "Score the draft against the brief's criteria"),
            PassDefinition::new(PassKey::Pass10, "Metadata & Schema", "Meta description and structured data"),
        ];
        Self { version: 1, passes }
    }
}

impl PassCatalog {
    /// Load a catalog from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pass catalog: {}", path.display()))?;
        let catalog: PassCatalog = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pass catalog JSON: {}", path.display()))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load from `path` when it exists, otherwise fall back to the default catalog.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize pass catalog")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write pass catalog: {}", path.display()))?;
        Ok(())
    }

    /// Check count bounds, contiguous numbering from 1 and key/number agreement.
    pub fn validate(&self) -> Result<()> {
        let count = self.passes.len() as u32;
        if !(MIN_PASSES..=MAX_PASSES).contains(&count) {
            anyhow::bail!(
                "Pass catalog must define between {} and {} passes, found {}",
                MIN_PASSES,
                MAX_PASSES,
                count
            );
        }
        for (idx, pass) in self.passes.iter().enumerate() {
            let expected = idx as u32 + 1;
            if pass.number != expected {
                anyhow::bail!(
                    "Pass catalog is not contiguous: position {} has number {}",
                    expected,
                    pass.number
                );
            }
            if pass.key.number() != pass.number {
                anyhow::bail!("Pass {} has mismatched key {}", pass.number, pass.key);
            }
            if pass.label.trim().is_empty() {
                anyhow::bail!("Pass {} has an empty label", pass.number);
            }
        }
        Ok(())
    }

    pub fn total_passes(&self) -> u32 {
        self.passes.len() as u32
    }

    pub fn get(&self, number: u32) -> Option<&PassDefinition> {
        let idx = usize::try_from(number).ok()?.checked_sub(1)?;
        self.passes.get(idx)
    }

    /// Whether a job with `total` passes can be driven by this catalog.
    pub fn covers(&self, total: u32) -> bool {
        total <= self.total_passes()
    }
}
