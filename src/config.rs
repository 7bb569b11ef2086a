//! Stream options and file-based defaults.
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! default_high_water_mark = 65536
//! default_object_high_water_mark = 16
//!
//! [readable]
//! object_mode = true
//!
//! [duplex]
//! allow_half_open = false
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default byte-mode high-water mark (64KB)
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Default object-mode high-water mark
pub const DEFAULT_OBJECT_HIGH_WATER_MARK: usize = 16;

/// Largest high-water mark a read request may raise the buffer to (1GB)
pub const MAX_HIGH_WATER_MARK: usize = 0x4000_0000;

fn default_true() -> bool {
    true
}

fn effective_hwm(explicit: Option<usize>, object_mode: bool) -> usize {
    explicit.unwrap_or(if object_mode {
        DEFAULT_OBJECT_HIGH_WATER_MARK
    } else {
        DEFAULT_HIGH_WATER_MARK
    })
}

/// Options for the readable side.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReadableOptions {
    pub high_water_mark: Option<usize>,
    pub object_mode: bool,
    pub auto_destroy: bool,
    pub emit_close: bool,
}

impl Default for ReadableOptions {
    fn default() -> Self {
        Self {
            high_water_mark: None,
            object_mode: false,
            auto_destroy: true,
            emit_close: true,
        }
    }
}

impl ReadableOptions {
    pub fn object_mode() -> Self {
        Self {
            object_mode: true,
            ..Self::default()
        }
    }

    pub fn with_high_water_mark(mut self, hwm: usize) -> Self {
        self.high_water_mark = Some(hwm);
        self
    }

    pub fn effective_high_water_mark(&self) -> usize {
        effective_hwm(self.high_water_mark, self.object_mode)
    }
}

/// Options for the writable side.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WritableOptions {
    pub high_water_mark: Option<usize>,
    pub object_mode: bool,
    pub auto_destroy: bool,
    pub emit_close: bool,
}

impl Default for WritableOptions {
    fn default() -> Self {
        Self {
            high_water_mark: None,
            object_mode: false,
            auto_destroy: true,
            emit_close: true,
        }
    }
}

impl WritableOptions {
    pub fn object_mode() -> Self {
        Self {
            object_mode: true,
            ..Self::default()
        }
    }

    pub fn with_high_water_mark(mut self, hwm: usize) -> Self {
        self.high_water_mark = Some(hwm);
        self
    }

    pub fn effective_high_water_mark(&self) -> usize {
        effective_hwm(self.high_water_mark, self.object_mode)
    }
}

/// Options for a duplex stream.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DuplexOptions {
    /// When false, ending either direction ends the other.
    pub allow_half_open: bool,
    pub readable: ReadableOptions,
    pub writable: WritableOptions,
}

impl Default for DuplexOptions {
    fn default() -> Self {
        Self {
            allow_half_open: true,
            readable: ReadableOptions::default(),
            writable: WritableOptions::default(),
        }
    }
}

impl DuplexOptions {
    pub fn object_mode() -> Self {
        Self {
            allow_half_open: true,
            readable: ReadableOptions::object_mode(),
            writable: WritableOptions::object_mode(),
        }
    }

    pub fn allow_half_open(mut self, allow: bool) -> Self {
        self.allow_half_open = allow;
        self
    }
}

/// Options for `pipe`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct PipeOptions {
    /// End the destination when the source ends.
    #[serde(default = "default_true")]
    pub end: bool,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self { end: true }
    }
}

/// Defaults loaded from a config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub default_high_water_mark: usize,
    pub default_object_high_water_mark: usize,
    pub readable: ReadableOptions,
    pub writable: WritableOptions,
    pub duplex: DuplexOptions,
    pub pipe: PipeOptions,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_high_water_mark: DEFAULT_HIGH_WATER_MARK,
            default_object_high_water_mark: DEFAULT_OBJECT_HIGH_WATER_MARK,
            readable: ReadableOptions::default(),
            writable: WritableOptions::default(),
            duplex: DuplexOptions::default(),
            pipe: PipeOptions::default(),
        }
    }
}

impl StreamConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: StreamConfig = toml::from_str(s).context("Failed to parse stream config")?;
        config.apply_defaults();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stream config {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Fill in unset high-water marks from the file-level defaults.
    fn apply_defaults(&mut self) {
        let bytes = self.default_high_water_mark;
        let objects = self.default_object_high_water_mark;
        let pick = |explicit: Option<usize>, object_mode: bool| {
            Some(explicit.unwrap_or(if object_mode { objects } else { bytes }))
        };

        self.readable.high_water_mark =
            pick(self.readable.high_water_mark, self.readable.object_mode);
        self.writable.high_water_mark =
            pick(self.writable.high_water_mark, self.writable.object_mode);
        self.duplex.readable.high_water_mark = pick(
            self.duplex.readable.high_water_mark,
            self.duplex.readable.object_mode,
        );
        self.duplex.writable.high_water_mark = pick(
            self.duplex.writable.high_water_mark,
            self.duplex.writable.object_mode,
        );
    }
}
