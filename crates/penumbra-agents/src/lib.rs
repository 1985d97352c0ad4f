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

//! # Penumbra Agents
//!
//! The orchestration layer of the light system. [`LightShadowRegistry`]
//! owns every light and shadow source, drives the shadow update scheduler
//! and queues the GPU commands that keep the light buffer in sync.

#![warn(missing_docs)]

pub mod light_agent;

pub use light_agent::{FrameReport, LightHandle, LightShadowRegistry};
