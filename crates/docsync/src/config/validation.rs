//! Configuration validation.

use super::{Config, MAX_BATCH_SIZE};
use crate::error::{Result, SyncError};
use crate::pattern::ExcludePatterns;

/// Validate the configuration. Fails fast, before any store is touched.
pub fn validate(config: &Config) -> Result<()> {
    for (label, endpoint) in [("source", &config.source), ("destination", &config.destination)] {
        match endpoint.kind.as_str() {
            "file" => {
                if endpoint.path.is_none() {
                    return Err(SyncError::Config(format!(
                        "{}.path is required for a file store",
                        label
                    )));
                }
            }
            "memory" => {}
            other => {
                return Err(SyncError::Config(format!(
                    "{}.type must be 'file' or 'memory', got '{}'",
                    label, other
                )));
            }
        }
    }

    let transfer = &config.transfer;

    if transfer.collections.is_empty() {
        return Err(SyncError::Config(
            "transfer.collections must list at least one collection".into(),
        ));
    }
    if transfer.batch_size == 0 || transfer.batch_size > MAX_BATCH_SIZE {
        return Err(SyncError::Config(format!(
            "transfer.batch_size must be between 1 and {}",
            MAX_BATCH_SIZE
        )));
    }
    if transfer.parallel == 0 {
        return Err(SyncError::Config(
            "transfer.parallel must be at least 1".into(),
        ));
    }
    if transfer.resume && transfer.dry_run {
        return Err(SyncError::Config(
            "transfer.resume cannot be combined with transfer.dry_run".into(),
        ));
    }

    for affix in [&transfer.id_prefix, &transfer.id_suffix].into_iter().flatten() {
        if affix.contains('/') {
            return Err(SyncError::Config(format!(
                "document id prefix/suffix must not contain '/': '{}'",
                affix
            )));
        }
    }

    for source in transfer.rename.keys() {
        if !transfer.collections.contains(source) {
            return Err(SyncError::Config(format!(
                "rename source '{}' is not in transfer.collections",
                source
            )));
        }
    }

    for filter in &transfer.filters {
        if filter.field.is_empty() {
            return Err(SyncError::Config("filter field must not be empty".into()));
        }
    }

    // Surface bad exclude globs here rather than mid-traversal.
    ExcludePatterns::new(&transfer.exclude)?;

    Ok(())
}
