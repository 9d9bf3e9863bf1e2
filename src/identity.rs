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

//! Entity names
//!
//! Names are unique. An entity has at most one name, and loses it when the
//! entity is destroyed.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::dispatch::Receiver;
use crate::entity::EntityHandle;
use crate::entity_system::EntitySystem;
use crate::error::{EcsError, Result};

#[derive(Default)]
struct NameRegistry {
    names: AHashMap<EntityHandle, String>,
    entities: AHashMap<String, EntityHandle>,
}

impl NameRegistry {
    fn forget(&mut self, entity: EntityHandle) -> Option<String> {
        let name = self.names.remove(&entity)?;
        self.entities.remove(&name);
        Some(name)
    }
}

fn forget_destroyed(registry: &mut NameRegistry, entity: EntityHandle) {
    if let Some(name) = registry.forget(entity) {
        tracing::trace!(entity = %entity, name = %name, "dropped name of destroyed entity");
    }
}

/// Two-way map between entities and their names.
pub struct IdentitySystem {
    registry: Rc<RefCell<NameRegistry>>,
    _entity_destroyed: Receiver<EntityHandle>,
}

impl IdentitySystem {
    /// Creates the system and subscribes it to `entities`' destroyed event.
    pub fn new(entities: &EntitySystem) -> Self {
        let registry = Rc::new(RefCell::new(NameRegistry::default()));

        let mut entity_destroyed = Receiver::new();
        entity_destroyed.bind_method(&registry, forget_destroyed);
        entities.events().destroyed().subscribe(&entity_destroyed);

        Self {
            registry,
            _entity_destroyed: entity_destroyed,
        }
    }

    /// Names `entity`, replacing any previous name. An empty name removes it.
    ///
    /// Fails if the handle is null or the name already belongs to another
    /// entity.
    pub fn set_entity_name(&mut self, entity: EntityHandle, name: impl Into<String>) -> Result<()> {
        if entity.is_null() {
            return Err(EcsError::InvalidEntity(entity));
        }

        let name = name.into();
        let mut registry = self.registry.borrow_mut();

        if name.is_empty() {
            registry.forget(entity);
            return Ok(());
        }

        match registry.entities.get(&name) {
            Some(&owner) if owner == entity => return Ok(()),
            Some(&owner) => return Err(EcsError::NameInUse { name, owner }),
            None => {}
        }

        registry.forget(entity);
        registry.entities.insert(name.clone(), entity);
        registry.names.insert(entity, name);
        Ok(())
    }

    pub fn entity_name(&self, entity: EntityHandle) -> Option<String> {
        self.registry.borrow().names.get(&entity).cloned()
    }

    /// Entity called `name`, or [`EntityHandle::INVALID`].
    pub fn lookup(&self, name: &str) -> EntityHandle {
        self.registry
            .borrow()
            .entities
            .get(name)
            .copied()
            .unwrap_or(EntityHandle::INVALID)
    }

    /// Number of named entities.
    pub fn len(&self) -> usize {
        self.registry.borrow().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
