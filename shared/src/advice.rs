//! Disease labels and the label → advice lookup.
//!
//! Advice is resolved once, when a record is created. Records keep the text
//! they were created with even if the table later changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ConfigError;
use crate::FALLBACK_ADVICE;

/// Labels the inference service is known to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiseaseLabel {
    #[serde(rename = "Bacterial Leaf Blight")]
    BacterialLeafBlight,
    #[serde(rename = "Brown Spot")]
    BrownSpot,
    #[serde(rename = "Healthy Rice Leaf")]
    Healthy,
    #[serde(rename = "Leaf Blast")]
    LeafBlast,
    #[serde(rename = "Leaf Scald")]
    LeafScald,
    #[serde(rename = "NOT_A_RICE_LEAF")]
    NotARiceLeaf,
    #[serde(rename = "Sheath Blight")]
    SheathBlight,
}

impl DiseaseLabel {
    pub const ALL: [Self; 7] = [
        Self::BacterialLeafBlight,
        Self::BrownSpot,
        Self::Healthy,
        Self::LeafBlast,
        Self::LeafScald,
        Self::NotARiceLeaf,
        Self::SheathBlight,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BacterialLeafBlight => "Bacterial Leaf Blight",
            Self::BrownSpot => "Brown Spot",
            Self::Healthy => "Healthy Rice Leaf",
            Self::LeafBlast => "Leaf Blast",
            Self::LeafScald => "Leaf Scald",
            Self::NotARiceLeaf => "NOT_A_RICE_LEAF",
            Self::SheathBlight => "Sheath Blight",
        }
    }

    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == label)
    }

    /// False for the "not a rice leaf" sentinel.
    #[must_use]
    pub const fn is_recognized(self) -> bool {
        !matches!(self, Self::NotARiceLeaf)
    }

    #[must_use]
    pub const fn is_disease(self) -> bool {
        !matches!(self, Self::Healthy | Self::NotARiceLeaf)
    }

    const fn default_advice(self) -> &'static str {
        match self {
            Self::BacterialLeafBlight => {
                "Use resistant varieties, avoid excess nitrogen and keep fields well drained. Remove infected stubble after harvest."
            }
            Self::BrownSpot => {
                "Improve soil fertility, especially potassium and silicon. Use certified seed and apply a recommended fungicide if spots spread."
            }
            Self::Healthy => {
                "Your rice leaf looks healthy. Keep monitoring regularly and maintain balanced fertilization and water management."
            }
            Self::LeafBlast => {
                "Avoid excess nitrogen and keep the field flooded. Apply a recommended blast fungicide at the first signs."
            }
            Self::LeafScald => {
                "Use clean seed and avoid dense planting. Apply a recommended fungicide if lesions reach the upper leaves."
            }
            Self::NotARiceLeaf => {
                "This photo does not look like a rice leaf. Retake the picture with a single leaf filling the frame."
            }
            Self::SheathBlight => {
                "Reduce plant density and nitrogen, drain the field periodically and apply a recommended fungicide early."
            }
        }
    }
}

impl fmt::Display for DiseaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceTable {
    entries: BTreeMap<String, String>,
    #[serde(default = "default_fallback")]
    fallback: String,
}

fn default_fallback() -> String {
    FALLBACK_ADVICE.to_string()
}

impl Default for AdviceTable {
    fn default() -> Self {
        let entries = DiseaseLabel::ALL
            .into_iter()
            .map(|l| (l.as_str().to_string(), l.default_advice().to_string()))
            .collect();
        Self {
            entries,
            fallback: default_fallback(),
        }
    }
}

impl AdviceTable {
    /// A table with no entries; every label resolves to `fallback`.
    pub fn empty(fallback: impl Into<String>) -> Result<Self, ConfigError> {
        let table = Self {
            entries: BTreeMap::new(),
            fallback: fallback.into(),
        };
        table.validate()?;
        Ok(table)
    }

    #[must_use]
    pub fn with_entry(mut self, label: impl Into<String>, advice: impl Into<String>) -> Self {
        self.entries.insert(label.into(), advice.into());
        self
    }

    /// Advice for `label`, or the fallback for labels the table does not know.
    #[must_use]
    pub fn resolve(&self, label: &str) -> &str {
        self.entries.get(label).map_or(self.fallback.as_str(), String::as_str)
    }

    #[must_use]
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback.trim().is_empty() {
            return Err(ConfigError::EmptyAdvice {
                label: "<fallback>".into(),
            });
        }
        if let Some((label, _)) = self.entries.iter().find(|(_, a)| a.trim().is_empty()) {
            return Err(ConfigError::EmptyAdvice {
                label: label.clone(),
            });
        }
        Ok(())
    }
}
