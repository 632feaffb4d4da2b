use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Printing technology. The closed enumeration named in the data model —
/// canonical form is uppercase on the wire and in path segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Technology {
    Fdm,
    Sla,
}

impl Technology {
    pub const ALL: [Technology; 2] = [Technology::Fdm, Technology::Sla];

    /// Parse a path segment or request field, accepting any case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "FDM" => Some(Technology::Fdm),
            "SLA" => Some(Technology::Sla),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Technology::Fdm => "FDM",
            Technology::Sla => "SLA",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque material identifier. Comparison against the registry is
/// case-insensitive but the canonical spelling supplied at creation time
/// is what gets persisted and returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material(pub String);

impl Material {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn fold_key(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for Material {
    fn eq(&self, other: &Self) -> bool {
        self.fold_key() == other.fold_key()
    }
}

/// In-memory `technology -> material -> hourly_rate` map, the shape persisted
/// to `configs/pricing.json`. Keys are matched case-insensitively through
/// [`PricingMap::rate_for`]/[`PricingMap::find_key`], but the stored key
/// preserves whatever case the registry was seeded or created with.
pub type MaterialRates = HashMap<String, u64>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingMap {
    #[serde(rename = "FDM", default)]
    pub fdm: MaterialRates,
    #[serde(rename = "SLA", default)]
    pub sla: MaterialRates,
}

impl PricingMap {
    pub fn rates_for(&self, tech: Technology) -> &MaterialRates {
        match tech {
            Technology::Fdm => &self.fdm,
            Technology::Sla => &self.sla,
        }
    }

    pub fn rates_for_mut(&mut self, tech: Technology) -> &mut MaterialRates {
        match tech {
            Technology::Fdm => &mut self.fdm,
            Technology::Sla => &mut self.sla,
        }
    }

    /// Canonical stored key matching `material` case-insensitively, if any.
    pub fn find_key(&self, tech: Technology, material: &str) -> Option<&str> {
        let folded = material.to_ascii_lowercase();
        self.rates_for(tech)
            .keys()
            .find(|k| k.to_ascii_lowercase() == folded)
            .map(String::as_str)
    }

    /// Rate lookup with fallback, per the registry contract: exact match,
    /// else the first finite positive rate for the technology, else 0.
    pub fn rate_for(&self, tech: Technology, material: &str) -> u64 {
        if let Some(key) = self.find_key(tech, material) {
            return self.rates_for(tech)[key];
        }
        self.rates_for(tech)
            .values()
            .copied()
            .find(|rate| *rate > 0)
            .unwrap_or(0)
    }

    pub fn default_seed() -> Self {
        let mut fdm = MaterialRates::new();
        fdm.insert("default".to_string(), 900);
        fdm.insert("PLA".to_string(), 800);
        fdm.insert("PETG".to_string(), 900);
        fdm.insert("ABS".to_string(), 950);

        let mut sla = MaterialRates::new();
        sla.insert("default".to_string(), 1800);
        sla.insert("Standard".to_string(), 1800);
        sla.insert("Tough".to_string(), 2200);

        Self { fdm, sla }
    }

    /// Merge `self` over `defaults`: entries present in `self` win, missing
    /// technologies/materials are backfilled from `defaults`.
    pub fn merged_over_defaults(mut self, defaults: &PricingMap) -> Self {
        for (material, rate) in &defaults.fdm {
            self.fdm.entry(material.clone()).or_insert(*rate);
        }
        for (material, rate) in &defaults.sla {
            self.sla.entry(material.clone()).or_insert(*rate);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn technology_parse_is_case_insensitive() {
        assert_eq!(Technology::parse("fdm"), Some(Technology::Fdm));
        assert_eq!(Technology::parse("Sla"), Some(Technology::Sla));
        assert_eq!(Technology::parse("resin"), None);
    }

    #[test]
    fn material_equality_is_case_insensitive() {
        assert_eq!(Material::new("PETG"), Material::new("petg"));
        assert_ne!(Material::new("PETG"), Material::new("PLA"));
    }

    #[test]
    fn rate_for_exact_then_fallback_then_zero() {
        let map = PricingMap::default_seed();
        assert_eq!(map.rate_for(Technology::Fdm, "petg"), 900);

        let empty = PricingMap::default();
        assert_eq!(empty.rate_for(Technology::Fdm, "petg"), 0);

        let mut only_other = PricingMap::default();
        only_other.fdm.insert("Exotic".to_string(), 1200);
        assert_eq!(only_other.rate_for(Technology::Fdm, "petg"), 1200);
    }

    #[test]
    fn merge_backfills_missing_defaults_without_overwriting() {
        let mut stored = PricingMap::default();
        stored.fdm.insert("PETG".to_string(), 1000);

        let merged = stored.merged_over_defaults(&PricingMap::default_seed());
        assert_eq!(merged.fdm.get("PETG"), Some(&1000));
        assert_eq!(merged.fdm.get("PLA"), Some(&800));
    }
}
