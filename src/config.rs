use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning knobs for fuzzy identity resolution.
///
/// The similarity threshold lives here, not in the resolution logic: what
/// counts as "the same address" was chosen empirically and deployments are
/// expected to override it per provider mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Minimum trigram similarity (0.0..=1.0) for a stored listing to count
    /// as a duplicate candidate.
    pub min_similarity: f64,
    /// Upper bound on candidate rows examined per fuzzy resolution.
    pub max_fuzzy_candidates: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            max_fuzzy_candidates: 25,
        }
    }
}

pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("listing_store.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<StoreConfig>> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: StoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &StoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_between_zero_and_one() {
        let cfg = StoreConfig::default();
        assert!(cfg.min_similarity > 0.0 && cfg.min_similarity < 1.0);
        assert!(cfg.max_fuzzy_candidates > 1);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = StoreConfig {
            min_similarity: 0.62,
            max_fuzzy_candidates: 10,
        };
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: StoreConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.min_similarity, 0.62);
        assert_eq!(back.max_fuzzy_candidates, 10);
    }
}
