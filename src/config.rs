// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Kernel configuration
//!
//! ```
//! use lifecycle_ecs::KernelConfig;
//!
//! let config = KernelConfig::from_json_str(r#"{ "initial_slot_capacity": 1024 }"#).unwrap();
//! assert_eq!(config.initial_slot_capacity, 1024);
//! assert_eq!(config.max_entities, None);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tuning knobs for the entity system. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Slots reserved up front in the handle table
    pub initial_slot_capacity: usize,

    /// Commands reserved up front in the deferred queue
    pub initial_command_capacity: usize,

    /// Upper bound on slot count; `None` means the full `i32` identifier range
    pub max_entities: Option<u32>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            initial_slot_capacity: 64,
            initial_command_capacity: 64,
            max_entities: None,
        }
    }
}

impl KernelConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        tracing::debug!(path = %path.display(), ?config, "loaded kernel config");
        Ok(config)
    }

    /// Identifier ceiling actually enforced by the allocator.
    pub fn identifier_limit(&self) -> usize {
        let hard = i32::MAX as usize;
        self.max_entities
            .map_or(hard, |max| (max as usize).min(hard))
    }
}
