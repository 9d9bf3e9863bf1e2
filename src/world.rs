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

//! World: the entity system plus the systems that hang off its events
//!
//! ```
//! use lifecycle_ecs::{Component, World};
//!
//! struct Health(u32);
//! impl Component for Health {}
//!
//! let mut world = World::new();
//! let hero = world.create_entity();
//! world.add_component(hero, Health(10)).unwrap();
//! world.set_entity_name(hero, "hero").unwrap();
//! world.process_commands();
//!
//! assert_eq!(world.find_entity("hero"), hero);
//! assert_eq!(world.component::<Health>(hero).map(|health| health.0), Some(10));
//! ```

use std::cell::{Ref, RefMut};

use crate::component::{Component, ComponentSystem};
use crate::config::KernelConfig;
use crate::entity::EntityHandle;
use crate::entity_system::EntitySystem;
use crate::error::{EcsError, Result};
use crate::identity::IdentitySystem;

/// Owns the lifecycle kernel and its collaborators.
///
/// Collaborators are built after the entity system and subscribe to its
/// events in their constructors.
pub struct World {
    identity: IdentitySystem,
    components: ComponentSystem,
    entities: EntitySystem,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(&KernelConfig::default())
    }

    pub fn with_config(config: &KernelConfig) -> Self {
        let entities = EntitySystem::with_config(config);
        let components = ComponentSystem::new(&entities);
        let identity = IdentitySystem::new(&entities);

        tracing::debug!(?config, "world created");

        Self {
            identity,
            components,
            entities,
        }
    }

    /// Read access, plus subscription to the lifecycle events. Mutation goes
    /// through the `World` so collaborators stay subscribed.
    pub fn entities(&self) -> &EntitySystem {
        &self.entities
    }

    pub fn components(&self) -> &ComponentSystem {
        &self.components
    }

    pub fn identity(&self) -> &IdentitySystem {
        &self.identity
    }

    /// Reserves a handle. The entity becomes active on the next
    /// [`World::process_commands`].
    pub fn create_entity(&mut self) -> EntityHandle {
        self.entities.create_entity()
    }

    pub fn destroy_entity(&mut self, entity: EntityHandle) {
        self.entities.destroy_entity(entity);
    }

    pub fn process_commands(&mut self) {
        self.entities.process_commands();
    }

    pub fn is_handle_valid(&self, entity: EntityHandle) -> bool {
        self.entities.is_handle_valid(entity)
    }

    pub fn entity_count(&self) -> u32 {
        self.entities.entity_count()
    }

    /// Attaches a component to a valid entity.
    pub fn add_component<T: Component>(&mut self, entity: EntityHandle, component: T) -> Result<()> {
        self.check_valid(entity)?;
        self.components.insert(entity, component)
    }

    pub fn component<T: Component>(&self, entity: EntityHandle) -> Option<Ref<'_, T>> {
        self.components.get(entity)
    }

    pub fn component_mut<T: Component>(&mut self, entity: EntityHandle) -> Option<RefMut<'_, T>> {
        self.components.get_mut(entity)
    }

    pub fn remove_component<T: Component>(&mut self, entity: EntityHandle) -> Option<T> {
        self.components.remove(entity)
    }

    pub fn set_entity_name(&mut self, entity: EntityHandle, name: impl Into<String>) -> Result<()> {
        self.check_valid(entity)?;
        self.identity.set_entity_name(entity, name)
    }

    pub fn entity_name(&self, entity: EntityHandle) -> Option<String> {
        self.identity.entity_name(entity)
    }

    /// Entity called `name`, or [`EntityHandle::INVALID`].
    pub fn find_entity(&self, name: &str) -> EntityHandle {
        self.identity.lookup(name)
    }

    /// Destroys every entity right away. Collaborators see a destroyed event
    /// for each one.
    pub fn shutdown(&mut self) {
        tracing::debug!(entities = self.entities.entity_count(), "world shutdown");
        self.entities.destroy_all_entities();
    }

    fn check_valid(&self, entity: EntityHandle) -> Result<()> {
        if self.entities.is_handle_valid(entity) {
            Ok(())
        } else {
            Err(EcsError::InvalidEntity(entity))
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
