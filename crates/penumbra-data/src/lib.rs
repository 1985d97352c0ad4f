// Copyright 2025 eraflo
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

//! # Penumbra Data
//!
//! Storage for the light system: fixed-capacity slot tables, the shadow
//! atlas tile allocator and the GPU command queue.

#![warn(missing_docs)]

pub mod allocators;
pub mod atlas;
pub mod command_queue;

pub use allocators::SlotAllocator;
pub use atlas::ShadowAtlas;
pub use command_queue::CommandQueue;
