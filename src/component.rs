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

//! Components and per-type component pools.
//!
//! Components are attached to an entity between `create_entity` and the
//! next `process_commands`. During processing every component of the new
//! entity gets a chance to `finalize` itself, with read access to the
//! entity's other components; one refusal cancels the whole entity.
//! Destroyed entities lose all their components.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::dispatch::Receiver;
use crate::entity::EntityHandle;
use crate::entity_system::EntitySystem;
use crate::error::{EcsError, Result};

/// Data attached to entities.
pub trait Component: 'static {
    /// Called while the owning entity is being finalized.
    /// Returning `false` cancels the entity.
    fn finalize(&mut self, _entity: EntityHandle, _siblings: &ComponentView<'_>) -> bool {
        true
    }
}

/// Read-only view of the other components of an entity being finalized.
///
/// The component being finalized is not visible through its own view.
pub struct ComponentView<'a> {
    entity: EntityHandle,
    pools: &'a PoolMap,
}

impl<'a> ComponentView<'a> {
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    pub fn get<T: Component>(&self) -> Option<&'a T> {
        ComponentSystem::pool::<T>(self.pools).and_then(|pool| pool.get(self.entity))
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.get::<T>().is_some()
    }
}

/// Storage for one component type, keyed by handle.
pub struct ComponentPool<T: Component> {
    components: AHashMap<EntityHandle, T>,
}

impl<T: Component> ComponentPool<T> {
    pub fn new() -> Self {
        Self {
            components: AHashMap::new(),
        }
    }

    /// Adds a component. Returns `false` if `entity` already has one.
    pub fn insert(&mut self, entity: EntityHandle, component: T) -> bool {
        match self.components.entry(entity) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(component);
                true
            }
        }
    }

    pub fn get(&self, entity: EntityHandle) -> Option<&T> {
        self.components.get(&entity)
    }

    pub fn get_mut(&mut self, entity: EntityHandle) -> Option<&mut T> {
        self.components.get_mut(&entity)
    }

    pub fn remove(&mut self, entity: EntityHandle) -> Option<T> {
        self.components.remove(&entity)
    }

    pub fn clear(&mut self) {
        self.components.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &T)> {
        self.components.iter().map(|(entity, component)| (*entity, component))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityHandle, &mut T)> {
        self.components
            .iter_mut()
            .map(|(entity, component)| (*entity, component))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl<T: Component> Default for ComponentPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased pool, as seen by the lifecycle receivers.
trait AnyPool {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn contains(&self, entity: EntityHandle) -> bool;
    fn finalize(&mut self, entity: EntityHandle, siblings: &ComponentView<'_>) -> bool;
    fn remove_entity(&mut self, entity: EntityHandle) -> bool;
    fn component_name(&self) -> &'static str;
}

impl<T: Component> AnyPool for ComponentPool<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn contains(&self, entity: EntityHandle) -> bool {
        self.components.contains_key(&entity)
    }

    fn finalize(&mut self, entity: EntityHandle, siblings: &ComponentView<'_>) -> bool {
        self.get_mut(entity)
            .map_or(true, |component| component.finalize(entity, siblings))
    }

    fn remove_entity(&mut self, entity: EntityHandle) -> bool {
        self.remove(entity).is_some()
    }

    fn component_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type PoolMap = AHashMap<TypeId, Box<dyn AnyPool>>;

// Each pool is taken out of the map while its components finalize, so they
// can read every other pool.
fn finalize_entity(pools: &mut PoolMap, entity: EntityHandle) -> bool {
    let owned: SmallVec<[TypeId; 8]> = pools
        .iter()
        .filter(|(_, pool)| pool.contains(entity))
        .map(|(type_id, _)| *type_id)
        .collect();

    for type_id in owned {
        let Some(mut pool) = pools.remove(&type_id) else {
            continue;
        };
        let accepted = pool.finalize(entity, &ComponentView { entity, pools: &*pools });
        let component = pool.component_name();
        pools.insert(type_id, pool);

        if !accepted {
            tracing::debug!(entity = %entity, component, "component refused to finalize");
            return false;
        }
    }
    true
}

fn remove_entity(pools: &mut PoolMap, entity: EntityHandle) {
    let mut removed = 0usize;
    for pool in pools.values_mut() {
        if pool.remove_entity(entity) {
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::trace!(entity = %entity, removed, "removed components of destroyed entity");
    }
}

/// Owns every component pool and keeps them in step with entity lifecycle.
pub struct ComponentSystem {
    pools: Rc<RefCell<PoolMap>>,
    _entity_finalize: Receiver<EntityHandle, bool>,
    _entity_destroyed: Receiver<EntityHandle>,
}

impl ComponentSystem {
    /// Creates the system and subscribes it to `entities`' finalize and
    /// destroyed events. It unsubscribes when dropped.
    pub fn new(entities: &EntitySystem) -> Self {
        let pools = Rc::new(RefCell::new(PoolMap::default()));

        let mut entity_finalize = Receiver::new();
        entity_finalize.bind_method(&pools, finalize_entity);
        entities.events().finalize().subscribe(&entity_finalize);

        let mut entity_destroyed = Receiver::new();
        entity_destroyed.bind_method(&pools, remove_entity);
        entities.events().destroyed().subscribe(&entity_destroyed);

        Self {
            pools,
            _entity_finalize: entity_finalize,
            _entity_destroyed: entity_destroyed,
        }
    }

    /// Attaches `component` to `entity`.
    pub fn insert<T: Component>(&mut self, entity: EntityHandle, component: T) -> Result<()> {
        let mut pools = self.pools.borrow_mut();
        let pool = pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(ComponentPool::<T>::new()))
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .expect("pool stored under another type's TypeId");

        if pool.insert(entity, component) {
            Ok(())
        } else {
            Err(EcsError::ComponentAlreadyExists {
                entity,
                component: std::any::type_name::<T>(),
            })
        }
    }

    pub fn get<T: Component>(&self, entity: EntityHandle) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.pools.borrow(), |pools| {
            Self::pool::<T>(pools).and_then(|pool| pool.get(entity))
        })
        .ok()
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityHandle) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.pools.borrow_mut(), |pools| {
            Self::pool_mut::<T>(pools).and_then(|pool| pool.get_mut(entity))
        })
        .ok()
    }

    pub fn remove<T: Component>(&mut self, entity: EntityHandle) -> Option<T> {
        let mut pools = self.pools.borrow_mut();
        Self::pool_mut::<T>(&mut pools)?.remove(entity)
    }

    pub fn contains<T: Component>(&self, entity: EntityHandle) -> bool {
        self.get::<T>(entity).is_some()
    }

    /// Number of `T` components across all entities.
    pub fn count<T: Component>(&self) -> usize {
        Self::pool::<T>(&self.pools.borrow()).map_or(0, ComponentPool::len)
    }

    pub fn for_each<T: Component>(&self, mut f: impl FnMut(EntityHandle, &T)) {
        let pools = self.pools.borrow();
        if let Some(pool) = Self::pool::<T>(&pools) {
            for (entity, component) in pool.iter() {
                f(entity, component);
            }
        }
    }

    pub fn for_each_mut<T: Component>(&mut self, mut f: impl FnMut(EntityHandle, &mut T)) {
        let mut pools = self.pools.borrow_mut();
        if let Some(pool) = Self::pool_mut::<T>(&mut pools) {
            for (entity, component) in pool.iter_mut() {
                f(entity, component);
            }
        }
    }

    /// Number of component types seen so far.
    pub fn pool_count(&self) -> usize {
        self.pools.borrow().len()
    }

    fn pool<T: Component>(pools: &PoolMap) -> Option<&ComponentPool<T>> {
        pools
            .get(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any().downcast_ref())
    }

    fn pool_mut<T: Component>(pools: &mut PoolMap) -> Option<&mut ComponentPool<T>> {
        pools
            .get_mut(&TypeId::of::<T>())
            .and_then(|pool| pool.as_any_mut().downcast_mut())
    }
}
