//! Pipeline settings: the tunable knobs of the source, allocator, and sink.

use std::path::Path;

use serde::{Deserialize, Serialize};

use flujo_core::AllocatorProperties;

use crate::error::ConfigError;

/// Settings for the async IO source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Bytes per queued byte-range request.
    pub chunk_size: usize,
    /// Upper bound a consumer should use when waiting for a completion, in
    /// milliseconds.
    pub wait_timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            wait_timeout_ms: 5_000,
        }
    }
}

/// Settings for per-connection sample allocators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorSettings {
    /// Number of buffers in the pool.
    pub buffer_count: usize,
    /// Size of each buffer in bytes.
    pub buffer_size: usize,
    /// Buffer alignment; must be a power of two.
    pub alignment: usize,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        let properties = AllocatorProperties::default();
        Self {
            buffer_count: properties.buffer_count,
            buffer_size: properties.buffer_size,
            alignment: properties.alignment,
        }
    }
}

impl From<AllocatorSettings> for AllocatorProperties {
    fn from(settings: AllocatorSettings) -> Self {
        Self {
            buffer_count: settings.buffer_count,
            buffer_size: settings.buffer_size,
            alignment: settings.alignment,
        }
    }
}

/// Settings for the presentation-side scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Bound on outstanding queued samples; producers block beyond it.
    pub max_queued_samples: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            max_queued_samples: 8,
        }
    }
}

/// The full pipeline configuration, one section per component.
///
/// # Example
///
/// ```rust
/// use flujo_config::PipelineSettings;
///
/// let settings: PipelineSettings = toml::from_str(
///     r#"
///     [source]
///     chunk_size = 32768
///
///     [sink]
///     max_queued_samples = 4
///     "#,
/// )
/// .unwrap();
/// assert_eq!(settings.source.chunk_size, 32768);
/// assert_eq!(settings.sink.max_queued_samples, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Async IO source section.
    pub source: SourceSettings,
    /// Sample allocator section.
    pub allocator: AllocatorSettings,
    /// Presentation sink section.
    pub sink: SinkSettings,
}

impl PipelineSettings {
    /// Loads settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Saves settings to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ConfigError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every section for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.chunk_size == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "source.chunk_size",
                reason: "must be nonzero",
            });
        }
        if self.allocator.buffer_count == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "allocator.buffer_count",
                reason: "must be at least 1",
            });
        }
        if self.allocator.buffer_size == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "allocator.buffer_size",
                reason: "must be nonzero",
            });
        }
        if !self.allocator.alignment.is_power_of_two() {
            return Err(ConfigError::InvalidSetting {
                field: "allocator.alignment",
                reason: "must be a power of two",
            });
        }
        if self.sink.max_queued_samples == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "sink.max_queued_samples",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}
