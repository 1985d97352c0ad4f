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

//! Rendering-facing types of the light system: lights, shadow sources,
//! the GPU command record, and the render-target contract.

pub mod command;
pub mod light;
pub mod shadow;
pub mod traits;

pub use self::command::{command_defines, CommandType, GpuCommand, GPU_COMMAND_SIZE};
pub use self::light::{Light, LightKind, PointLight, SourceRange, SpotLight};
pub use self::shadow::{AtlasRegion, BoundingSphere, ShadowSource, ShadowView, UvRect};
pub use self::traits::ShadowRenderTarget;
