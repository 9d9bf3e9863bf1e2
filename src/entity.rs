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

//! Entity handles and slot metadata.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Identifier value that never names an entity.
pub const INVALID_IDENTIFIER: i32 = 0;

/// Generational reference to an entity.
///
/// `identifier` is the 1-based slot index, `version` counts how many times
/// that slot has been freed. A copy of a handle goes stale as soon as its
/// slot is freed; it never owns anything.
///
/// Ordering is lexicographic on `(identifier, version)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntityHandle {
    pub identifier: i32,
    pub version: i32,
}

impl EntityHandle {
    /// The null handle. Never valid.
    pub const INVALID: EntityHandle = EntityHandle {
        identifier: INVALID_IDENTIFIER,
        version: 0,
    };

    pub const fn new(identifier: i32, version: i32) -> Self {
        Self {
            identifier,
            version,
        }
    }

    /// True for handles that cannot name any slot.
    pub fn is_null(&self) -> bool {
        self.identifier <= INVALID_IDENTIFIER
    }

    /// Slot index for this handle, if the identifier is in range at all.
    pub(crate) fn slot_index(&self) -> Option<usize> {
        if self.is_null() {
            None
        } else {
            Some((self.identifier - 1) as usize)
        }
    }
}

// Identifier alone is enough: live handles never share an identifier.
impl Hash for EntityHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identifier, self.version)
    }
}

/// Per-slot state bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleFlags(u8);

impl HandleFlags {
    /// Allocated but unused. Every slot on the free list has exactly this.
    pub const FREE: HandleFlags = HandleFlags(0);
    /// Handed out by `create_entity`.
    pub const VALID: HandleFlags = HandleFlags(1 << 0);
    /// Finalized by `process_commands`.
    pub const ACTIVE: HandleFlags = HandleFlags(1 << 1);
    /// Scheduled to be destroyed.
    pub const DESTROY: HandleFlags = HandleFlags(1 << 2);

    pub fn contains(self, other: HandleFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn insert(&mut self, other: HandleFlags) {
        self.0 |= other.0;
    }

    pub fn is_free(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for HandleFlags {
    type Output = HandleFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        HandleFlags(self.0 | rhs.0)
    }
}

/// Sentinel for "no next free slot".
pub(crate) const INVALID_NEXT_FREE: i32 = -1;

/// Slot table entry. Slot `i` always holds identifier `i + 1`.
#[derive(Debug, Clone, Copy)]
pub struct HandleSlot {
    pub handle: EntityHandle,
    pub(crate) next_free: i32,
    pub flags: HandleFlags,
}

impl HandleSlot {
    pub(crate) fn new(identifier: i32) -> Self {
        Self {
            handle: EntityHandle::new(identifier, 0),
            next_free: INVALID_NEXT_FREE,
            flags: HandleFlags::FREE,
        }
    }

    /// Invalidates every handle to this slot. Versions wrap, so a stale
    /// handle only matches again after 2^32 reuses of the same slot.
    pub(crate) fn bump_version(&mut self) {
        self.handle.version = self.handle.version.wrapping_add(1);
    }
}

/// Kind of a deferred lifecycle command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Create,
    Destroy,
}

/// Deferred lifecycle change, applied by `process_commands`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityCommand {
    pub kind: CommandKind,
    pub handle: EntityHandle,
}
