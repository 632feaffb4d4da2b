use slicer_types::{Material, PricingMap, SlicerError, SlicerResult, Technology};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// In-memory pricing table backed by a JSON file on disk.
///
/// Mutations are serialized through a single mutex guarding the whole
/// read-modify-write-persist sequence, so readers (`get_all`, `rate_for`)
/// always observe a state that matches what was last written to disk.
pub struct PricingRegistry {
    path: PathBuf,
    state: Mutex<PricingMap>,
}

impl PricingRegistry {
    /// Load the registry from `path`, seeding defaults if the file is absent
    /// and backfilling missing technologies/materials from the default seed
    /// when it is present. A parse failure falls back to defaults and
    /// re-persists, per the registry's `load()` contract.
    pub async fn load(path: impl AsRef<Path>) -> SlicerResult<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let defaults = PricingMap::default_seed();

        let map = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<PricingMap>(&contents) {
                Ok(parsed) => parsed.merged_over_defaults(&defaults),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "pricing file failed to parse, falling back to defaults");
                    defaults.clone()
                }
            },
            Err(_) => defaults.clone(),
        };

        let registry = Arc::new(Self {
            path,
            state: Mutex::new(map),
        });
        registry.persist().await?;
        Ok(registry)
    }

    pub async fn get_all(&self) -> PricingMap {
        self.state.lock().await.clone()
    }

    pub async fn rate_for(&self, tech: Technology, material: &str) -> u64 {
        self.state.lock().await.rate_for(tech, material)
    }

    /// The canonical stored spelling for `material`, if a case-insensitive
    /// match exists in the registry.
    pub async fn canonical_material(&self, tech: Technology, material: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .find_key(tech, material)
            .map(str::to_string)
    }

    /// Create a new material rate. Rejects if `material` already exists
    /// (case-insensitive). Returns the canonical stored key.
    pub async fn create(
        &self,
        tech: Technology,
        material: &str,
        price: u64,
    ) -> SlicerResult<String> {
        validate_price(price)?;
        let mut guard = self.state.lock().await;
        if guard.find_key(tech, material).is_some() {
            return Err(SlicerError::MaterialAlreadyExists {
                technology: tech,
                material: material.to_string(),
            });
        }
        let canonical = Material::new(material).as_str().to_string();
        guard.rates_for_mut(tech).insert(canonical.clone(), price);
        persist_locked(&self.path, &guard).await?;
        Ok(canonical)
    }

    /// Create-or-update a material rate at its existing canonical key, or
    /// insert under `material` verbatim if it does not yet exist.
    pub async fn update(
        &self,
        tech: Technology,
        material: &str,
        price: u64,
    ) -> SlicerResult<String> {
        validate_price(price)?;
        let mut guard = self.state.lock().await;
        let canonical = guard
            .find_key(tech, material)
            .map(str::to_string)
            .unwrap_or_else(|| material.to_string());
        guard.rates_for_mut(tech).insert(canonical.clone(), price);
        persist_locked(&self.path, &guard).await?;
        Ok(canonical)
    }

    /// Delete a material rate. Rejects deleting `"default"` (case-insensitive)
    /// to preserve the fallback rate, and 404s if the material is absent.
    pub async fn delete(&self, tech: Technology, material: &str) -> SlicerResult<()> {
        if material.eq_ignore_ascii_case("default") {
            return Err(SlicerError::CannotDeleteDefault);
        }
        let mut guard = self.state.lock().await;
        let canonical = guard
            .find_key(tech, material)
            .map(str::to_string)
            .ok_or_else(|| SlicerError::MaterialNotFound {
                technology: tech,
                material: material.to_string(),
            })?;
        guard.rates_for_mut(tech).remove(&canonical);
        persist_locked(&self.path, &guard).await?;
        Ok(())
    }

    async fn persist(&self) -> SlicerResult<()> {
        let guard = self.state.lock().await;
        persist_locked(&self.path, &guard).await
    }
}

fn validate_price(price: u64) -> SlicerResult<()> {
    if price == 0 {
        return Err(SlicerError::Validation(
            "price must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Write `map` to a sibling temp file and rename over `path`, so a crash
/// mid-write cannot corrupt the registry.
async fn persist_locked(path: &Path, map: &PricingMap) -> SlicerResult<()> {
    let serialized = serde_json::to_string_pretty(map)
        .map_err(|e| SlicerError::Internal(format!("failed to serialize pricing map: {e}")))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SlicerError::Internal(format!("failed to create pricing directory: {e}"))
            })?;
        }
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, serialized.as_bytes())
        .await
        .map_err(|e| SlicerError::Internal(format!("failed to write pricing temp file: {e}")))?;

    tokio::fs::rename(&tmp_path, path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "failed to persist pricing registry");
        SlicerError::Internal(format!("failed to persist pricing file: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_defaults_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");

        let registry = PricingRegistry::load(&path).await.unwrap();
        let all = registry.get_all().await;

        assert_eq!(all.fdm.get("PLA"), Some(&800));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn create_then_rate_for_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        let registry = PricingRegistry::load(&path).await.unwrap();

        registry
            .create(Technology::Fdm, "ASA", 1200)
            .await
            .unwrap();
        assert_eq!(registry.rate_for(Technology::Fdm, "asa").await, 1200);

        let err = registry.create(Technology::Fdm, "asa", 999).await;
        assert!(matches!(
            err,
            Err(SlicerError::MaterialAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn update_creates_or_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        let registry = PricingRegistry::load(&path).await.unwrap();

        registry.update(Technology::Fdm, "ASA", 1200).await.unwrap();
        registry.update(Technology::Fdm, "ASA", 950).await.unwrap();
        assert_eq!(registry.rate_for(Technology::Fdm, "ASA").await, 950);
    }

    #[tokio::test]
    async fn delete_rejects_default_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        let registry = PricingRegistry::load(&path).await.unwrap();

        let err = registry.delete(Technology::Fdm, "default").await;
        assert!(matches!(err, Err(SlicerError::CannotDeleteDefault)));

        let err = registry.delete(Technology::Fdm, "Nonexistent").await;
        assert!(matches!(err, Err(SlicerError::MaterialNotFound { .. })));

        registry.create(Technology::Fdm, "ASA", 1200).await.unwrap();
        registry.delete(Technology::Fdm, "asa").await.unwrap();
        assert!(registry.get_all().await.fdm.get("ASA").is_none());
    }

    #[tokio::test]
    async fn persisted_file_round_trips_through_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pricing.json");
        let registry = PricingRegistry::load(&path).await.unwrap();
        registry.create(Technology::Sla, "Clear", 2000).await.unwrap();
        drop(registry);

        let reloaded = PricingRegistry::load(&path).await.unwrap();
        assert_eq!(reloaded.rate_for(Technology::Sla, "Clear").await, 2000);
    }
}
