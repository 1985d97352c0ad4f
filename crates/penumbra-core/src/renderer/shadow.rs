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

//! Shadow source and atlas region types.
//!
//! A [`ShadowSource`] is one render viewpoint of one light. When scheduled it
//! is given an [`AtlasRegion`] in the shared shadow atlas; the matching
//! [`UvRect`] is what shaders use to sample it.

use super::command::GpuCommand;
use super::traits::ShadowRenderTarget;
use crate::error::CommandError;
use crate::math::{Mat4, Vec3, Vec4};

/// Default shadow map resolution in texels.
pub const DEFAULT_SHADOW_RESOLUTION: u32 = 512;

/// A sphere used for distance culling of shadow sources.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    /// Center in world space.
    pub center: Vec3,
    /// Radius in world units.
    pub radius: f32,
}

impl BoundingSphere {
    /// Creates a new bounding sphere.
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Distance from `point` to the sphere surface (negative when inside).
    #[inline]
    pub fn surface_distance(&self, point: Vec3) -> f32 {
        point.distance(self.center) - self.radius
    }
}

/// A rectangle of atlas tiles, in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasRegion {
    /// Left tile column.
    pub x: u32,
    /// Top tile row.
    pub y: u32,
    /// Width in tiles.
    pub w: u32,
    /// Height in tiles.
    pub h: u32,
}

impl AtlasRegion {
    /// Creates a new region.
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Number of tiles covered.
    #[inline]
    pub fn area(&self) -> u32 {
        self.w * self.h
    }

    /// Returns `true` if the two regions share at least one tile.
    pub fn overlaps(&self, other: &AtlasRegion) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// A normalized rectangle inside the atlas texture.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UvRect {
    /// Left edge in `[0, 1]`.
    pub x: f32,
    /// Top edge in `[0, 1]`.
    pub y: f32,
    /// Width in `[0, 1]`.
    pub w: f32,
    /// Height in `[0, 1]`.
    pub h: f32,
}

impl UvRect {
    /// Creates a new UV rectangle.
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Packs the rect as `(x, y, w, h)`.
    pub fn to_vec4(&self) -> Vec4 {
        Vec4::new(self.x, self.y, self.w, self.h)
    }
}

/// One shadow-map render viewpoint owned by a light.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSource {
    slot: Option<usize>,
    needs_update: bool,
    resolution: u32,
    view_projection: Mat4,
    bounds: BoundingSphere,
    region: Option<AtlasRegion>,
    uv_region: UvRect,
}

impl ShadowSource {
    /// Creates a detached source that needs an initial update.
    pub fn new() -> Self {
        Self {
            slot: None,
            needs_update: true,
            resolution: DEFAULT_SHADOW_RESOLUTION,
            view_projection: Mat4::IDENTITY,
            bounds: BoundingSphere::default(),
            region: None,
            uv_region: UvRect::default(),
        }
    }

    /// The slot this source occupies in the shadow-source table.
    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    /// Records the slot assigned by the owning table.
    pub fn set_slot(&mut self, slot: usize) {
        self.slot = Some(slot);
    }

    /// Forgets the table slot.
    pub fn clear_slot(&mut self) {
        self.slot = None;
    }

    /// Returns `true` if the shadow map must be (re)drawn.
    ///
    /// A source without an atlas region always needs an update.
    pub fn needs_update(&self) -> bool {
        self.needs_update || self.region.is_none()
    }

    /// Sets or clears the explicit update flag.
    pub fn set_needs_update(&mut self, flag: bool) {
        self.needs_update = flag;
    }

    /// Shadow map resolution in texels.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Changes the shadow map resolution, flagging the source when it differs.
    pub fn set_resolution(&mut self, resolution: u32) {
        if self.resolution != resolution {
            self.resolution = resolution;
            self.needs_update = true;
        }
    }

    /// The combined view-projection matrix.
    pub fn view_projection(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Replaces the view-projection matrix and flags the source for update.
    pub fn set_view_projection(&mut self, view_projection: Mat4) {
        self.view_projection = view_projection;
        self.needs_update = true;
    }

    /// Culling bounds of the source's frustum.
    pub fn bounds(&self) -> &BoundingSphere {
        &self.bounds
    }

    /// Overrides the culling bounds without touching the lens.
    pub fn set_bounds(&mut self, bounds: BoundingSphere) {
        self.bounds = bounds;
    }

    /// Builds a square perspective frustum at `position` looking along `direction`.
    ///
    /// Updates the view-projection and the bounding sphere enclosing the frustum,
    /// and flags the source. Returns `false` and leaves the source unchanged when
    /// the lens is degenerate (zero direction, or `near`/`far` misordered).
    pub fn set_perspective_lens(
        &mut self,
        fov: f32,
        near: f32,
        far: f32,
        position: Vec3,
        direction: Vec3,
    ) -> bool {
        let forward = direction.normalize();
        if forward == Vec3::ZERO {
            log::warn!("ShadowSource: ignoring lens with a zero view direction");
            return false;
        }
        let up = if forward.dot(Vec3::Y).abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        };

        let (Some(view), Some(projection)) = (
            Mat4::look_at_rh(position, position + forward, up),
            Mat4::perspective_rh_zo(fov, 1.0, near, far),
        ) else {
            log::warn!("ShadowSource: ignoring degenerate lens (near={near}, far={far})");
            return false;
        };

        self.set_view_projection(projection * view);
        self.bounds = frustum_bounds(fov, near, far, position, forward, up);
        true
    }

    /// The atlas region currently held, if any.
    pub fn region(&self) -> Option<AtlasRegion> {
        self.region
    }

    /// The UV rect of the held region; zeroed when none is held.
    pub fn uv_region(&self) -> UvRect {
        self.uv_region
    }

    /// Returns `true` if the source holds an atlas region.
    pub fn has_region(&self) -> bool {
        self.region.is_some()
    }

    /// Stores a freshly reserved region and its UV rect.
    pub fn set_region(&mut self, region: AtlasRegion, uv_region: UvRect) {
        self.region = Some(region);
        self.uv_region = uv_region;
    }

    /// Drops the region, returning it so the caller can free it in the atlas.
    pub fn take_region(&mut self) -> Option<AtlasRegion> {
        self.uv_region = UvRect::default();
        self.region.take()
    }

    /// Points a render target at this source's viewpoint and atlas rect.
    pub fn apply_to<T: ShadowRenderTarget + ?Sized>(&self, target: &mut T) {
        target.set_active(true);
        target.set_view_projection(&self.view_projection);
        target.set_viewport(self.uv_region);
    }

    /// Appends the view-projection and UV rect to a `StoreSource` command.
    pub fn write_command(&self, cmd: &mut GpuCommand) -> Result<(), CommandError> {
        cmd.push_mat4(&self.view_projection)?;
        cmd.push_vec4(self.uv_region.to_vec4())
    }
}

impl Default for ShadowSource {
    fn default() -> Self {
        Self::new()
    }
}

fn frustum_bounds(
    fov: f32,
    near: f32,
    far: f32,
    position: Vec3,
    forward: Vec3,
    up: Vec3,
) -> BoundingSphere {
    let side = forward.cross(up).normalize();
    let up = side.cross(forward);
    let tan_half = (fov * 0.5).tan();

    let mut min = Vec3::new(f32::MAX, f32::MAX, f32::MAX);
    let mut max = Vec3::new(f32::MIN, f32::MIN, f32::MIN);
    let mut corners = [Vec3::ZERO; 8];
    let mut i = 0;
    for depth in [near, far] {
        let half = depth * tan_half;
        let plane_center = position + forward * depth;
        for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
            let corner = plane_center + side * (sx * half) + up * (sy * half);
            min = min.min(corner);
            max = max.max(corner);
            corners[i] = corner;
            i += 1;
        }
    }

    let center = (min + max) * 0.5;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(center))
        .fold(0.0, f32::max);
    BoundingSphere::new(center, radius)
}

/// A plain render target that records the state the scheduler assigns to it.
///
/// Render backends read these after each update to configure their shadow
/// cameras and viewports.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShadowView {
    /// Whether the target renders this frame.
    pub active: bool,
    /// Camera view-projection.
    pub view_projection: Mat4,
    /// Normalized viewport inside the atlas.
    pub viewport: UvRect,
}

impl ShadowRenderTarget for ShadowView {
    fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn set_view_projection(&mut self, view_projection: &Mat4) {
        self.view_projection = *view_projection;
    }

    fn set_viewport(&mut self, viewport: UvRect) {
        self.viewport = viewport;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{approx_eq, degrees_to_radians, FRAC_PI_2};
    use crate::renderer::command::CommandType;

    #[test]
    fn test_new_source_needs_update() {
        let source = ShadowSource::new();
        assert!(source.needs_update());
        assert!(!source.has_region());
        assert_eq!(source.resolution(), DEFAULT_SHADOW_RESOLUTION);
    }

    #[test]
    fn test_needs_update_without_region_even_if_flag_cleared() {
        let mut source = ShadowSource::new();
        source.set_needs_update(false);
        assert!(source.needs_update());

        source.set_region(AtlasRegion::new(0, 0, 4, 4), UvRect::new(0.0, 0.0, 0.5, 0.5));
        assert!(!source.needs_update());
    }

    #[test]
    fn test_take_region_resets_uv() {
        let mut source = ShadowSource::new();
        let region = AtlasRegion::new(1, 2, 3, 3);
        source.set_region(region, UvRect::new(0.1, 0.2, 0.3, 0.3));
        assert_eq!(source.take_region(), Some(region));
        assert_eq!(source.uv_region(), UvRect::default());
        assert!(source.take_region().is_none());
    }

    #[test]
    fn test_perspective_lens_bounds_contain_frustum() {
        let mut source = ShadowSource::new();
        source.set_needs_update(false);
        let position = Vec3::new(10.0, 0.0, 0.0);
        assert!(source.set_perspective_lens(FRAC_PI_2, 1.0, 10.0, position, Vec3::X));
        assert!(source.needs_update());

        let bounds = source.bounds();
        // Center lies along the view direction, between near and far.
        assert!(bounds.center.x > position.x);
        assert!(approx_eq(bounds.center.y, 0.0));
        // The far plane corners (half extent 10 at fov 90) must be inside.
        let far_corner = Vec3::new(20.0, 10.0, 10.0);
        assert!(far_corner.distance(bounds.center) <= bounds.radius + 1e-3);
        // The apex-side near corners too.
        let near_corner = Vec3::new(11.0, -1.0, 1.0);
        assert!(near_corner.distance(bounds.center) <= bounds.radius + 1e-3);
    }

    #[test]
    fn test_perspective_lens_projects_forward_point_into_clip_space() {
        let mut source = ShadowSource::new();
        source.set_perspective_lens(
            degrees_to_radians(60.0),
            0.5,
            20.0,
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
        );
        let p = source
            .view_projection()
            .project_point3(Vec3::new(0.0, 0.0, -10.0));
        assert!(approx_eq(p.x, 0.0));
        assert!(approx_eq(p.y, 0.0));
        assert!(p.z > 0.0 && p.z < 1.0);
    }

    #[test]
    fn test_perspective_lens_vertical_direction_is_supported() {
        let mut source = ShadowSource::new();
        assert!(source.set_perspective_lens(FRAC_PI_2, 0.5, 5.0, Vec3::ZERO, -Vec3::Y));
    }

    #[test]
    fn test_degenerate_lens_is_ignored() {
        let mut source = ShadowSource::new();
        source.set_needs_update(false);
        let before = source.clone();
        assert!(!source.set_perspective_lens(FRAC_PI_2, 1.0, 10.0, Vec3::ZERO, Vec3::ZERO));
        assert!(!source.set_perspective_lens(FRAC_PI_2, 10.0, 1.0, Vec3::ZERO, Vec3::X));
        assert_eq!(source, before);
    }

    #[test]
    fn test_surface_distance() {
        let sphere = BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 4.0);
        assert!(approx_eq(sphere.surface_distance(Vec3::ZERO), 6.0));
        assert!(sphere.surface_distance(Vec3::new(0.0, 0.0, 9.0)) < 0.0);
    }

    #[test]
    fn test_region_overlap() {
        let a = AtlasRegion::new(0, 0, 2, 2);
        assert!(a.overlaps(&AtlasRegion::new(1, 1, 2, 2)));
        assert!(!a.overlaps(&AtlasRegion::new(2, 0, 2, 2)));
        assert!(!a.overlaps(&AtlasRegion::new(0, 2, 2, 2)));
        assert_eq!(a.area(), 4);
    }

    #[test]
    fn test_write_command_layout() {
        let mut source = ShadowSource::new();
        source.set_region(AtlasRegion::new(0, 0, 1, 1), UvRect::new(0.25, 0.5, 0.125, 0.125));
        let mut cmd = GpuCommand::new(CommandType::StoreSource);
        cmd.push_int(3).unwrap();
        source.write_command(&mut cmd).unwrap();
        assert_eq!(cmd.len(), 22);
        assert_eq!(cmd.data()[2], 1.0); // identity m00
        assert_eq!(&cmd.data()[18..22], &[0.25, 0.5, 0.125, 0.125]);
    }

    #[test]
    fn test_apply_to_render_target() {
        let mut source = ShadowSource::new();
        let uv = UvRect::new(0.5, 0.0, 0.25, 0.25);
        source.set_region(AtlasRegion::new(8, 0, 4, 4), uv);
        let mut view = ShadowView::default();
        source.apply_to(&mut view);
        assert!(view.is_active());
        assert_eq!(view.viewport, uv);
        assert_eq!(view.view_projection, Mat4::IDENTITY);
    }
}
