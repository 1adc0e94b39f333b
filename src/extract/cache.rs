//! On-disk cache of extracted metrics, keyed by (CIK, fiscal year).

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// Cache of metric maps under `{dir}/{cik}_{year}.json`. Consulted before
/// any extraction call and populated after; load/save failures degrade to a
/// cache miss rather than failing the extraction.
#[derive(Debug, Clone)]
pub struct MetricsCache {
    dir: PathBuf,
}

impl MetricsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, cik: &str, year: i32) -> PathBuf {
        self.dir.join(format!("{}_{}.json", cik, year))
    }

    pub fn load(&self, cik: &str, year: i32) -> Option<HashMap<String, f64>> {
        let path = self.entry_path(cik, year);
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    warn!("Error loading cache for {}_{}: {}", cik, year, e);
                    None
                }
            },
            Err(e) => {
                warn!("Error loading cache for {}_{}: {}", cik, year, e);
                None
            }
        }
    }

    pub fn save(&self, cik: &str, year: i32, metrics: &HashMap<String, f64>) {
        if let Err(e) = self.try_save(cik, year, metrics) {
            warn!("Error saving cache for {}_{}: {}", cik, year, e);
        }
    }

    fn try_save(&self, cik: &str, year: i32, metrics: &HashMap<String, f64>) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let text = serde_json::to_string(metrics)?;
        std::fs::write(self.entry_path(cik, year), text)?;
        Ok(())
    }

    #[cfg(test)]
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}
