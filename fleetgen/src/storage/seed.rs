use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{DataLayout, StorageError, read_json, write_json_atomic};

/// Contents of `seed_manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedManifest {
    pub seed: u64,
    pub updated_at: DateTime<Utc>,
}

/// Decide the base seed for this process.
///
/// A configured seed wins and is recorded. Otherwise the manifest's seed is
/// reused, and only when there is none is a fresh one drawn from entropy.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read or written.
pub fn resolve_seed(layout: &DataLayout, configured: Option<u64>, now: DateTime<Utc>) -> Result<u64, StorageError> {
    if let Some(seed) = configured {
        write_seed_manifest(layout, seed, now)?;
        info!(seed, "Using configured seed");
        return Ok(seed);
    }

    if let Some(manifest) = read_json::<SeedManifest>(&layout.seed_manifest_file())? {
        info!(seed = manifest.seed, "Reusing seed from manifest");
        return Ok(manifest.seed);
    }

    let seed = u64::from(rand::random::<u32>());
    write_seed_manifest(layout, seed, now)?;
    info!(seed, "Generated new seed");
    Ok(seed)
}

/// Record `seed` in the manifest.
///
/// # Errors
///
/// Returns an error if the manifest cannot be written.
pub fn write_seed_manifest(layout: &DataLayout, seed: u64, now: DateTime<Utc>) -> Result<(), StorageError> {
    write_json_atomic(&layout.seed_manifest_file(), "seed manifest", &SeedManifest { seed, updated_at: now })
}
