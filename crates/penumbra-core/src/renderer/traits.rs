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

//! Contracts between the light system and the render backend.

use super::shadow::UvRect;
use crate::math::Mat4;

/// One pre-allocated (camera, atlas viewport) pair used to draw a shadow map.
///
/// The shadow scheduler owns a fixed pool of these, one per simultaneous
/// shadow update. Each frame it activates and aims as many as it scheduled
/// updates and deactivates the rest, so the backend never draws a stale slot.
pub trait ShadowRenderTarget {
    /// Enables or disables rendering through this target.
    fn set_active(&mut self, active: bool);

    /// Returns whether the target renders this frame.
    fn is_active(&self) -> bool;

    /// Sets the camera's combined view-projection matrix.
    fn set_view_projection(&mut self, view_projection: &Mat4);

    /// Sets the normalized region of the atlas the camera renders into.
    fn set_viewport(&mut self, viewport: UvRect);
}
