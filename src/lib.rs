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

//! Lifecycle ECS - entity lifecycle kernel
//!
//! Generational entity handles with deferred creation and destruction,
//! plus the typed multicast events that let other systems follow (and veto)
//! every entity's lifecycle.

pub mod collector;
pub mod component;
pub mod config;
pub mod dispatch;
pub mod entity;
pub mod entity_system;
pub mod error;
pub mod identity;
pub mod prelude;
pub mod world;


pub use collector::*;
pub use component::*;
pub use config::*;
pub use dispatch::*;
pub use entity::*;
pub use entity_system::*;
pub use error::*;
pub use identity::*;
pub use world::*;
