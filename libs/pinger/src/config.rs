// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Engine configuration

use crate::sequencer::{DEFAULT_PACKET_ID, DEFAULT_PAYLOAD_LEN};

#[cfg(feature = "serde")]
use anyhow::{Context, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use std::path::Path;

pub const DEFAULT_COUNT: u32 = 4;
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PingerConfig {
    /// Echo identifier
    pub packet_id: u16,
    /// Payload bytes after the 8 byte echo header
    pub payload_len: u16,
    /// Requests per sequence
    pub count: u32,
    /// Reply window per request, in ms
    pub timeout_ms: u32,
}

impl Default for PingerConfig {
    fn default() -> Self {
        Self {
            packet_id: DEFAULT_PACKET_ID,
            payload_len: DEFAULT_PAYLOAD_LEN,
            count: DEFAULT_COUNT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[cfg(feature = "serde")]
impl PingerConfig {
    /// Load a JSON config. A missing file yields the defaults; fields
    /// left out of the file keep their default values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir: {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("failed to write config: {}", path.display()))
    }
}
