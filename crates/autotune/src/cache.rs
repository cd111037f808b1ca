//! Tuning result caching.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A state chosen for one workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunedSelection {
    /// Which tuner produced the choice (`run-first`, `decision-tree`, ...).
    pub tuner: String,
    pub state: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_seconds: Option<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TuningCache {
    selections: BTreeMap<String, TunedSelection>,
}

impl TuningCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<K: Serialize>(&self, workload: &K) -> Option<&TunedSelection> {
        self.selections.get(&workload_key(workload))
    }

    pub fn insert<K: Serialize>(&mut self, workload: &K, selection: TunedSelection) {
        self.selections.insert(workload_key(workload), selection);
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read(path)
            .with_context(|| format!("failed to read tuning cache {}", path.display()))?;
        let cache = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse tuning cache {}", path.display()))?;
        Ok(cache)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

fn workload_key<K: Serialize>(workload: &K) -> String {
    serde_json::to_string(workload).unwrap_or_else(|_| "invalid-workload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Shape {
        rows: usize,
        cols: usize,
    }

    #[test]
    fn selections_round_trip_through_disk() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "formtune-cache-{}-{}.json",
            std::process::id(),
            line!()
        ));
        let mut cache = TuningCache::load_from_file(&path)?;
        assert!(cache.is_empty());

        let shape = Shape { rows: 4, cols: 4 };
        cache.insert(
            &shape,
            TunedSelection {
                tuner: "run-first".into(),
                state: 2,
                average_seconds: Some(1.5e-6),
            },
        );
        cache.save_to_file(&path)?;

        let reloaded = TuningCache::load_from_file(&path)?;
        fs::remove_file(&path)?;
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&shape).map(|s| s.state), Some(2));
        assert!(reloaded.get(&Shape { rows: 4, cols: 5 }).is_none());
        Ok(())
    }
}
