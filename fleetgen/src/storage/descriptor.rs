use std::fmt::Write;

use chrono::{DateTime, Utc};
use tracing::info;

use super::{DataLayout, StorageError, write_text_atomic};
use crate::config::GenerationConfig;
use crate::models::format_timestamp;

/// Write `manifests/dataset.md` unless it already exists.
///
/// The descriptor records the seed and the generation settings a reader needs
/// to reproduce the dataset. It is written once per dataset; a clean removes
/// it along with the data it describes. Returns whether a file was written.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_dataset_descriptor(
    layout: &DataLayout,
    config: &GenerationConfig,
    seed: u64,
    now: DateTime<Utc>,
) -> Result<bool, StorageError> {
    let path = layout.dataset_descriptor_file();
    if path.exists() {
        return Ok(false);
    }

    write_text_atomic(&path, &render(config, seed, now))?;
    info!(path = %path.display(), seed, "Created dataset descriptor");
    Ok(true)
}

fn render(config: &GenerationConfig, seed: u64, now: DateTime<Utc>) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "# Dataset Descriptor\n");
    let _ = writeln!(text, "**Generated**: {}", format_timestamp(now));
    let _ = writeln!(text, "**Seed**: {seed}");
    let _ = writeln!(text, "**Mode**: {}\n", config.generation_mode());

    let _ = writeln!(text, "## Configuration\n");
    let _ = writeln!(text, "- **Companies per batch**: {}", config.active_company_count());
    let _ = writeln!(text, "- **Drivers per company**: {}", config.drivers_per_company);
    let _ = writeln!(
        text,
        "- **Event rate per driver**: {} (per driver interval)",
        config.event_rate_per_driver
    );
    let _ = writeln!(text, "- **Company interval**: {}", config.active_company_interval());
    let _ = writeln!(text, "- **Driver interval**: {}", config.active_driver_interval());
    if let Some(bounds) = config.active_event_bounds() {
        let _ = writeln!(text, "- **Events per driver batch**: {} to {}", bounds.min, bounds.max);
    }
    let quality = &config.quality_injection;
    if quality.enabled {
        let _ = writeln!(text, "- **Quality injection**: enabled, error rate {}", quality.error_rate);
    } else {
        let _ = writeln!(text, "- **Quality injection**: disabled");
    }

    let _ = writeln!(text, "\n## Reproducibility\n");
    let _ = writeln!(text, "To reproduce this dataset exactly:");
    let _ = writeln!(text, "1. Use seed: `{seed}`");
    let _ = writeln!(text, "2. Apply the configuration above");
    let _ = writeln!(
        text,
        "3. Batch `n` of each generator draws from the stream seeded with `seed + n`"
    );
    text
}
