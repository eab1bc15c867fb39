//! Engine configuration loaded from the environment.
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `SLOTFORGE_PREVIEW_SAMPLE_SIZE` | `preview_sample_size` | 20 |
//! | `SLOTFORGE_MAX_BINS_PER_ZONE` | `max_bins_per_zone` | 100 000 |
//! | `SLOTFORGE_BULK_CHUNK_SIZE` | `bulk_chunk_size` | 1 000 |
//! | `DATABASE_URL` | `database_url` | unset |

use std::str::FromStr;

use thiserror::Error;

pub const PREVIEW_SAMPLE_SIZE_VAR: &str = "SLOTFORGE_PREVIEW_SAMPLE_SIZE";
pub const MAX_BINS_PER_ZONE_VAR: &str = "SLOTFORGE_MAX_BINS_PER_ZONE";
pub const BULK_CHUNK_SIZE_VAR: &str = "SLOTFORGE_BULK_CHUNK_SIZE";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

pub const DEFAULT_BULK_CHUNK_SIZE: usize = 1_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?} as {expected}")]
    Malformed {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{var}: must be greater than zero")]
    Zero { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of bins `preview_reconfiguration` materializes as a sample.
    pub preview_sample_size: usize,
    /// Largest structure (in bins) accepted for a single zone.
    pub max_bins_per_zone: u64,
    /// Rows per bulk insert / soft-delete statement.
    pub bulk_chunk_size: usize,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview_sample_size: 20,
            max_bins_per_zone: 100_000,
            bulk_chunk_size: DEFAULT_BULK_CHUNK_SIZE,
            database_url: None,
        }
    }
}

impl EngineConfig {
    /// Reads the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`EngineConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            preview_sample_size: parse_var(
                &lookup,
                PREVIEW_SAMPLE_SIZE_VAR,
                defaults.preview_sample_size,
                "an unsigned integer",
            )?,
            max_bins_per_zone: positive(
                MAX_BINS_PER_ZONE_VAR,
                parse_var(
                    &lookup,
                    MAX_BINS_PER_ZONE_VAR,
                    defaults.max_bins_per_zone,
                    "an unsigned integer",
                )?,
            )?,
            bulk_chunk_size: positive(
                BULK_CHUNK_SIZE_VAR,
                parse_var(
                    &lookup,
                    BULK_CHUNK_SIZE_VAR,
                    defaults.bulk_chunk_size,
                    "an unsigned integer",
                )?,
            )?,
            database_url: lookup(DATABASE_URL_VAR)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn with_preview_sample_size(mut self, preview_sample_size: usize) -> Self {
        self.preview_sample_size = preview_sample_size;
        self
    }

    pub fn with_max_bins_per_zone(mut self, max_bins_per_zone: u64) -> Self {
        self.max_bins_per_zone = max_bins_per_zone;
        self
    }

    pub fn with_bulk_chunk_size(mut self, bulk_chunk_size: usize) -> Self {
        self.bulk_chunk_size = bulk_chunk_size.max(1);
        self
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Malformed {
            var,
            value: raw,
            expected,
        }),
    }
}

fn positive<T: Default + PartialEq>(var: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(ConfigError::Zero { var })
    } else {
        Ok(value)
    }
}
