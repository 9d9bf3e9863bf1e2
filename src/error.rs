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

//! Error types
//!
//! The lifecycle kernel itself never fails: stale handles are ignored and
//! broken invariants are assertions. These errors belong to the layers
//! built on top of it (components, names, configuration).

use std::fmt;

use crate::entity::EntityHandle;

/// ECS error type
#[derive(Debug, Clone)]
pub enum EcsError {
    /// Handle is null, expired or pending destruction
    InvalidEntity(EntityHandle),

    /// Entity already owns a component of this type
    ComponentAlreadyExists {
        entity: EntityHandle,
        component: &'static str,
    },

    /// Name is already given to another entity
    NameInUse {
        name: String,
        owner: EntityHandle,
    },

    /// Configuration could not be parsed
    Config(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::InvalidEntity(entity) => write!(f, "Invalid entity handle: {entity}"),
            EcsError::ComponentAlreadyExists { entity, component } => {
                write!(f, "Entity {entity} already has a {component} component")
            }
            EcsError::NameInUse { name, owner } => {
                write!(f, "Name '{name}' is already used by entity {owner}")
            }
            EcsError::Config(msg) => write!(f, "Config error: {msg}"),
            EcsError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<std::io::Error> for EcsError {
    fn from(err: std::io::Error) -> Self {
        EcsError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for EcsError {
    fn from(err: serde_json::Error) -> Self {
        EcsError::Config(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
