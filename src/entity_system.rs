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

//! Entity system: handle allocation and deferred lifecycle commands.
//!
//! `create_entity` and `destroy_entity` only touch the slot table and queue
//! a command. Nothing becomes live or dead until `process_commands`, which
//! is the per-tick synchronization point:
//!
//! ```
//! use lifecycle_ecs::EntitySystem;
//!
//! let mut entities = EntitySystem::new();
//! let entity = entities.create_entity();
//! // Attach components here. The entity is inactive until processed.
//! entities.process_commands();
//! assert_eq!(entities.entity_count(), 1);
//!
//! entities.destroy_entity(entity);
//! // Still alive until the next process_commands().
//! entities.process_commands();
//! assert!(!entities.is_handle_valid(entity));
//! ```
//!
//! Slot states:
//! `Free -> Valid -> Valid|Active -> Valid|Active|Destroy -> Free`.
//! A vetoed finalize takes `Valid -> Valid|Destroy -> Free` instead.

use std::collections::VecDeque;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::collector::CollectWhileTrue;
use crate::config::KernelConfig;
use crate::dispatch::{Dispatcher, EventTap};
use crate::entity::{
    CommandKind, EntityCommand, EntityHandle, HandleFlags, HandleSlot, INVALID_NEXT_FREE,
};

const INVALID_QUEUE_ELEMENT: i32 = -1;

/// FIFO of free slot indices threaded through `HandleSlot::next_free`.
///
/// `is_empty` is tracked separately: an empty queue and a one-element queue
/// both have `dequeue_index == enqueue_index`.
#[derive(Debug)]
struct FreeList {
    dequeue_index: i32,
    enqueue_index: i32,
    is_empty: bool,
}

impl FreeList {
    fn new() -> Self {
        Self {
            dequeue_index: INVALID_QUEUE_ELEMENT,
            enqueue_index: INVALID_QUEUE_ELEMENT,
            is_empty: true,
        }
    }

    fn push_back(&mut self, slots: &mut [HandleSlot], index: usize) {
        debug_assert!(slots[index].flags.is_free());
        debug_assert_eq!(slots[index].next_free, INVALID_NEXT_FREE);

        if self.is_empty {
            self.dequeue_index = index as i32;
            self.enqueue_index = index as i32;
            self.is_empty = false;
        } else {
            let tail = &mut slots[self.enqueue_index as usize];
            debug_assert_eq!(tail.next_free, INVALID_NEXT_FREE);
            tail.next_free = index as i32;
            self.enqueue_index = index as i32;
        }
    }

    fn pop_front(&mut self, slots: &mut [HandleSlot]) -> usize {
        debug_assert!(!self.is_empty);
        let index = self.dequeue_index as usize;

        if self.dequeue_index == self.enqueue_index {
            *self = Self::new();
        } else {
            self.dequeue_index = slots[index].next_free;
        }

        slots[index].next_free = INVALID_NEXT_FREE;
        index
    }

    /// Chains every slot, in index order, into one queue.
    fn rebuild(&mut self, slots: &mut [HandleSlot]) {
        let Some(last) = slots.len().checked_sub(1) else {
            *self = Self::new();
            return;
        };

        for (index, slot) in slots.iter_mut().enumerate() {
            slot.next_free = index as i32 + 1;
        }
        slots[last].next_free = INVALID_NEXT_FREE;

        self.dequeue_index = 0;
        self.enqueue_index = last as i32;
        self.is_empty = false;
    }
}

/// Lifecycle dispatchers owned by the entity system.
#[derive(Debug, Default)]
pub struct EntityEvents {
    finalize: Dispatcher<EntityHandle, bool, CollectWhileTrue>,
    created: Dispatcher<EntityHandle>,
    destroyed: Dispatcher<EntityHandle>,
}

impl EntityEvents {
    /// Called once per entity before activation. Any receiver returning
    /// `false` cancels the entity.
    pub fn finalize(&self) -> EventTap<'_, EntityHandle, bool> {
        self.finalize.tap()
    }

    /// Called after an entity became active.
    pub fn created(&self) -> EventTap<'_, EntityHandle> {
        self.created.tap()
    }

    /// Called right before an entity's slot is freed.
    pub fn destroyed(&self) -> EventTap<'_, EntityHandle> {
        self.destroyed.tap()
    }

    fn cleanup(&self) {
        self.finalize.cleanup();
        self.created.cleanup();
        self.destroyed.cleanup();
    }
}

/// Generational handle allocator with a deferred command queue.
#[derive(Debug)]
pub struct EntitySystem {
    commands: VecDeque<EntityCommand>,
    slots: Vec<HandleSlot>,
    entity_count: u32,
    free_list: FreeList,
    identifier_limit: usize,
    events: EntityEvents,
}

impl EntitySystem {
    pub fn new() -> Self {
        Self::with_config(&KernelConfig::default())
    }

    pub fn with_config(config: &KernelConfig) -> Self {
        Self {
            commands: VecDeque::with_capacity(config.initial_command_capacity),
            slots: Vec::with_capacity(config.initial_slot_capacity),
            entity_count: 0,
            free_list: FreeList::new(),
            identifier_limit: config.identifier_limit(),
            events: EntityEvents::default(),
        }
    }

    pub fn events(&self) -> &EntityEvents {
        &self.events
    }

    /// Allocates a handle and queues its creation.
    ///
    /// The returned handle is valid immediately but the entity stays
    /// inactive until the next `process_commands`.
    ///
    /// # Panics
    /// Panics if the identifier space configured for this system is used up.
    pub fn create_entity(&mut self) -> EntityHandle {
        if self.free_list.is_empty {
            assert!(
                self.slots.len() < self.identifier_limit,
                "entity identifier space exhausted at {} slots",
                self.slots.len()
            );

            let index = self.slots.len();
            self.slots.push(HandleSlot::new(index as i32 + 1));
            self.free_list.push_back(&mut self.slots, index);
        }

        let index = self.free_list.pop_front(&mut self.slots);
        let slot = &mut self.slots[index];
        slot.flags.insert(HandleFlags::VALID);
        let handle = slot.handle;

        self.commands.push_back(EntityCommand {
            kind: CommandKind::Create,
            handle,
        });

        tracing::trace!(entity = %handle, "entity create queued");
        handle
    }

    /// Queues destruction of `handle`. Invalid or already doomed handles
    /// are ignored.
    pub fn destroy_entity(&mut self, handle: EntityHandle) {
        if !self.is_handle_valid(handle) {
            tracing::trace!(entity = %handle, "ignored destroy of invalid handle");
            return;
        }

        let Some(slot) = handle.slot_index().and_then(|index| self.slots.get_mut(index)) else {
            return;
        };
        slot.flags.insert(HandleFlags::DESTROY);

        self.commands.push_back(EntityCommand {
            kind: CommandKind::Destroy,
            handle,
        });

        tracing::trace!(entity = %handle, "entity destroy queued");
    }

    /// Drains pending commands, then frees every remaining entity at once.
    ///
    /// Meant for shutdown: the free list is rebuilt as one chain over all
    /// slots in index order.
    pub fn destroy_all_entities(&mut self) {
        self.process_commands();

        if self.slots.is_empty() {
            return;
        }

        #[cfg(feature = "profiling")]
        let _span = info_span!("entity_system.destroy_all", slots = self.slots.len()).entered();

        let mut destroyed = 0usize;
        for index in 0..self.slots.len() {
            if !self.slots[index].flags.contains(HandleFlags::VALID) {
                continue;
            }

            self.events.destroyed.dispatch(self.slots[index].handle);

            let slot = &mut self.slots[index];
            slot.flags = HandleFlags::FREE;
            slot.bump_version();
            destroyed += 1;
        }

        self.entity_count = 0;
        self.free_list.rebuild(&mut self.slots);

        tracing::debug!(destroyed, slots = self.slots.len(), "destroyed all entities");
    }

    /// Applies queued commands in FIFO order.
    pub fn process_commands(&mut self) {
        if self.commands.is_empty() {
            return;
        }

        #[cfg(feature = "profiling")]
        let _span = info_span!("entity_system.process_commands", pending = self.commands.len()).entered();

        while let Some(command) = self.commands.pop_front() {
            match command.kind {
                CommandKind::Create => self.activate(command.handle),
                CommandKind::Destroy => self.release(command.handle),
            }
        }
    }

    /// True while `handle` names a created entity that is not pending
    /// destruction. Stale versions are rejected here.
    pub fn is_handle_valid(&self, handle: EntityHandle) -> bool {
        let Some(slot) = self.slot(handle) else {
            return false;
        };

        slot.flags.contains(HandleFlags::VALID)
            && !slot.flags.contains(HandleFlags::DESTROY)
            && slot.handle.version == handle.version
    }

    /// True once `handle` went through a successful finalize.
    pub fn is_handle_active(&self, handle: EntityHandle) -> bool {
        self.is_handle_valid(handle)
            && self
                .slot(handle)
                .is_some_and(|slot| slot.flags.contains(HandleFlags::ACTIVE))
    }

    /// Number of active entities.
    pub fn entity_count(&self) -> u32 {
        self.entity_count
    }

    /// Number of slots ever allocated (live or free).
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Destroys everything, detaches all subscribers and resets the tables.
    pub fn cleanup(&mut self) {
        self.destroy_all_entities();
        self.process_commands();

        self.events.cleanup();
        self.commands.clear();
        self.slots.clear();
        self.entity_count = 0;
        self.free_list = FreeList::new();
    }

    fn slot(&self, handle: EntityHandle) -> Option<&HandleSlot> {
        handle.slot_index().and_then(|index| self.slots.get(index))
    }

    /// Index of the slot a queued command refers to. A mismatch means the
    /// command outlived its handle, which only a bookkeeping bug can cause.
    fn command_slot(&self, command: CommandKind, handle: EntityHandle) -> Option<usize> {
        let index = handle.slot_index()?;
        match self.slots.get(index) {
            Some(slot) if slot.handle == handle => Some(index),
            slot => {
                tracing::error!(
                    ?command,
                    entity = %handle,
                    current = ?slot.map(|slot| slot.handle),
                    "queued command does not match its slot"
                );
                debug_assert!(false, "queued {command:?} for stale handle {handle}");
                None
            }
        }
    }

    fn activate(&mut self, handle: EntityHandle) {
        let Some(index) = self.command_slot(CommandKind::Create, handle) else {
            return;
        };

        if !self.events.finalize.dispatch(handle) {
            tracing::debug!(entity = %handle, "entity finalize vetoed");
            self.destroy_entity(handle);
            return;
        }

        let slot = &mut self.slots[index];
        debug_assert!(!slot.flags.contains(HandleFlags::ACTIVE));
        slot.flags.insert(HandleFlags::ACTIVE);
        self.entity_count += 1;

        self.events.created.dispatch(handle);
        tracing::trace!(entity = %handle, "entity created");
    }

    fn release(&mut self, handle: EntityHandle) {
        let Some(index) = self.command_slot(CommandKind::Destroy, handle) else {
            return;
        };

        self.events.destroyed.dispatch(handle);

        let slot = &self.slots[index];
        debug_assert!(slot.flags.contains(HandleFlags::DESTROY));
        // Vetoed entities never became active and were never counted.
        if slot.flags.contains(HandleFlags::ACTIVE) {
            self.entity_count -= 1;
        }

        self.free_handle(index);
        tracing::trace!(entity = %handle, "entity destroyed");
    }

    fn free_handle(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        debug_assert!(slot.flags.contains(HandleFlags::VALID));

        slot.flags = HandleFlags::FREE;
        slot.bump_version();

        self.free_list.push_back(&mut self.slots, index);
    }
}

impl Default for EntitySystem {
    fn default() -> Self {
        Self::new()
    }
}
