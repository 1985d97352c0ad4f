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

//! Defines the light model of the light system.
//!
//! A [`Light`] carries the attributes shared by every light plus a
//! [`LightKind`] holding the per-type data. The kind decides how many shadow
//! sources the light owns, how they are aimed, and which extra operands the
//! light writes into its `StoreLight` command.

use super::command::GpuCommand;
use super::shadow::{ShadowSource, DEFAULT_SHADOW_RESOLUTION};
use crate::error::{CommandError, LightError};
use crate::math::{degrees_to_radians, LinearRgba, Vec3};

/// Field of view of one point-light cube face: 90 degrees plus a small overlap
/// so neighbouring faces filter across the seam.
pub const POINT_FACE_FOV_DEGREES: f32 = 93.0;

const CUBE_FACE_DIRECTIONS: [Vec3; 6] = [
    Vec3::X,
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::Y,
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::Z,
    Vec3::new(0.0, 0.0, -1.0),
];

/// An omni-directional light with distance falloff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// Maximum range in world units; also the far plane of its shadow faces.
    pub radius: f32,
    /// Radius of the emitting sphere, used for soft falloff near the light.
    pub inner_radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            radius: 10.0,
            inner_radius: 0.01,
        }
    }
}

/// A cone-shaped light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    /// Maximum range in world units; also the far plane of its shadow source.
    pub radius: f32,
    /// Full cone angle in radians.
    pub fov: f32,
    /// Normalized direction the cone points at.
    pub direction: Vec3,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            radius: 10.0,
            fov: degrees_to_radians(45.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
        }
    }
}

/// The per-type part of a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// A point light, shadowed through six cube faces.
    Point(PointLight),
    /// A spot light, shadowed through a single frustum.
    Spot(SpotLight),
}

impl LightKind {
    /// GPU type tag for point lights.
    pub const TYPE_POINT: i32 = 1;
    /// GPU type tag for spot lights.
    pub const TYPE_SPOT: i32 = 2;

    /// The GPU type tag of this kind.
    pub fn type_tag(&self) -> i32 {
        match self {
            LightKind::Point(_) => Self::TYPE_POINT,
            LightKind::Spot(_) => Self::TYPE_SPOT,
        }
    }

    /// Number of shadow sources a shadow-casting light of this kind owns.
    pub fn num_shadow_sources(&self) -> usize {
        match self {
            LightKind::Point(_) => 6,
            LightKind::Spot(_) => 1,
        }
    }

    /// Range of the light in world units.
    pub fn radius(&self) -> f32 {
        match self {
            LightKind::Point(point) => point.radius,
            LightKind::Spot(spot) => spot.radius,
        }
    }

    /// Field of view and direction of shadow face `face`.
    fn shadow_view(&self, face: usize) -> (f32, Vec3) {
        match self {
            LightKind::Point(_) => (
                degrees_to_radians(POINT_FACE_FOV_DEGREES),
                CUBE_FACE_DIRECTIONS[face],
            ),
            LightKind::Spot(spot) => (spot.fov, spot.direction),
        }
    }

    /// Appends the kind-specific operands of a `StoreLight` command.
    pub fn write_command(&self, cmd: &mut GpuCommand) -> Result<(), CommandError> {
        match self {
            LightKind::Point(point) => {
                cmd.push_float(point.radius)?;
                cmd.push_float(point.inner_radius)
            }
            LightKind::Spot(spot) => {
                cmd.push_float(spot.radius)?;
                cmd.push_float((spot.fov * 0.5).cos())?;
                cmd.push_vec3(spot.direction)
            }
        }
    }
}

/// A contiguous run of shadow-source slots owned by one light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
    /// First slot of the run.
    pub first: usize,
    /// Number of slots in the run.
    pub count: usize,
}

impl SourceRange {
    /// Iterates the slots of the run in order.
    pub fn slots(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.count
    }
}

/// A light source managed by the light registry.
///
/// Every setter marks the light dirty so the next registry update re-sends it
/// to the GPU. Setters that move or reshape the light's shadow frusta also
/// invalidate its shadow sources.
///
/// # Examples
///
/// ```
/// use penumbra_core::math::Vec3;
/// use penumbra_core::renderer::light::{Light, LightKind, PointLight};
///
/// let mut lamp = Light::new(LightKind::Point(PointLight::default()));
/// lamp.set_position(Vec3::new(0.0, 2.0, 0.0));
/// lamp.set_casts_shadows(true).unwrap();
/// assert!(lamp.needs_update());
/// assert_eq!(lamp.num_shadow_sources(), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    kind: LightKind,
    position: Vec3,
    color: LinearRgba,
    intensity: f32,
    ies_profile: Option<u32>,
    casts_shadows: bool,
    shadow_resolution: u32,
    near_plane: f32,
    needs_update: bool,
    shadows_dirty: bool,
    slot: Option<usize>,
    shadow_sources: Option<SourceRange>,
}

impl Light {
    /// Creates a detached, white, non-shadow-casting light at the origin.
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            position: Vec3::ZERO,
            color: LinearRgba::WHITE,
            intensity: 20.0,
            ies_profile: None,
            casts_shadows: false,
            shadow_resolution: DEFAULT_SHADOW_RESOLUTION,
            near_plane: 0.5,
            needs_update: true,
            shadows_dirty: true,
            slot: None,
            shadow_sources: None,
        }
    }

    /// Shorthand for a point light with the given range.
    pub fn point(radius: f32) -> Self {
        Self::new(LightKind::Point(PointLight {
            radius,
            ..Default::default()
        }))
    }

    /// Shorthand for a spot light with the given range, cone angle and direction.
    pub fn spot(radius: f32, fov: f32, direction: Vec3) -> Self {
        Self::new(LightKind::Spot(SpotLight {
            radius,
            fov,
            direction: direction.normalize(),
        }))
    }

    fn mark_dirty(&mut self, affects_shadows: bool) {
        self.needs_update = true;
        self.shadows_dirty |= affects_shadows;
    }

    // --- Attributes ---

    /// The per-type data.
    pub fn kind(&self) -> &LightKind {
        &self.kind
    }

    /// Replaces the per-type data.
    ///
    /// Switching between kinds that own a different number of shadow sources
    /// is refused while the light is attached or holds shadow-source slots.
    pub fn set_kind(&mut self, kind: LightKind) -> Result<(), LightError> {
        let owns_sources =
            self.shadow_sources.is_some() || (self.is_attached() && self.casts_shadows);
        if owns_sources && kind.num_shadow_sources() != self.kind.num_shadow_sources() {
            return Err(LightError::LockedWhileAttached("kind"));
        }
        self.kind = kind;
        self.mark_dirty(true);
        Ok(())
    }

    /// World-space position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Moves the light.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.mark_dirty(true);
    }

    /// Colour, normalized to unit luminance.
    pub fn color(&self) -> LinearRgba {
        self.color
    }

    /// Sets the colour. The value is rescaled to unit luminance so that
    /// brightness is controlled by the intensity alone.
    pub fn set_color(&mut self, color: LinearRgba) {
        self.color = color.normalized_luminance();
        self.mark_dirty(false);
    }

    /// Sets the colour of a black-body radiator at `kelvin`.
    pub fn set_color_from_temperature(&mut self, kelvin: f32) {
        self.set_color(LinearRgba::from_temperature(kelvin));
    }

    /// Brightness multiplier.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Sets the brightness multiplier.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
        self.mark_dirty(false);
    }

    /// Index of the IES profile shaping the light, if any.
    pub fn ies_profile(&self) -> Option<u32> {
        self.ies_profile
    }

    /// Sets or clears the IES profile index.
    pub fn set_ies_profile(&mut self, profile: Option<u32>) {
        self.ies_profile = profile;
        self.mark_dirty(false);
    }

    /// Sets the range of the light.
    pub fn set_radius(&mut self, radius: f32) {
        match &mut self.kind {
            LightKind::Point(point) => point.radius = radius,
            LightKind::Spot(spot) => spot.radius = radius,
        }
        self.mark_dirty(true);
    }

    /// Sets the emitter radius of a point light. Ignored for spot lights.
    pub fn set_inner_radius(&mut self, inner_radius: f32) {
        if let LightKind::Point(point) = &mut self.kind {
            point.inner_radius = inner_radius.max(0.01);
            self.mark_dirty(false);
        } else {
            log::warn!("Light: inner radius only applies to point lights");
        }
    }

    /// Sets the cone angle (radians) of a spot light. Ignored for point lights.
    pub fn set_fov(&mut self, fov: f32) {
        if let LightKind::Spot(spot) = &mut self.kind {
            spot.fov = fov;
            self.mark_dirty(true);
        } else {
            log::warn!("Light: field of view only applies to spot lights");
        }
    }

    /// Sets the direction of a spot light. Ignored for point lights.
    pub fn set_direction(&mut self, direction: Vec3) {
        if let LightKind::Spot(spot) = &mut self.kind {
            spot.direction = direction.normalize();
            self.mark_dirty(true);
        } else {
            log::warn!("Light: direction only applies to spot lights");
        }
    }

    /// Points a spot light at `target`.
    pub fn look_at(&mut self, target: Vec3) {
        self.set_direction(target - self.position);
    }

    /// Whether the light casts shadows.
    pub fn casts_shadows(&self) -> bool {
        self.casts_shadows
    }

    /// Enables or disables shadows. Refused while the light is attached or
    /// holds shadow-source slots, since those are reserved on attach.
    pub fn set_casts_shadows(&mut self, flag: bool) -> Result<(), LightError> {
        if self.is_attached() || self.shadow_sources.is_some() {
            return Err(LightError::LockedWhileAttached("casts_shadows"));
        }
        self.casts_shadows = flag;
        self.mark_dirty(true);
        Ok(())
    }

    /// Resolution of each shadow map in texels.
    pub fn shadow_map_resolution(&self) -> u32 {
        self.shadow_resolution
    }

    /// Sets the shadow map resolution. Must be a multiple of the atlas tile
    /// size to be schedulable.
    pub fn set_shadow_map_resolution(&mut self, resolution: u32) {
        self.shadow_resolution = resolution;
        self.mark_dirty(true);
    }

    /// Near plane of the shadow frusta.
    pub fn near_plane(&self) -> f32 {
        self.near_plane
    }

    /// Sets the near plane of the shadow frusta.
    pub fn set_near_plane(&mut self, near_plane: f32) {
        self.near_plane = near_plane;
        self.mark_dirty(true);
    }

    // --- Update flags ---

    /// Whether the light must be re-sent to the GPU.
    pub fn needs_update(&self) -> bool {
        self.needs_update
    }

    /// Whether the shadow sources must be re-aimed.
    pub fn shadows_dirty(&self) -> bool {
        self.shadows_dirty
    }

    /// Clears both update flags.
    pub fn mark_clean(&mut self) {
        self.needs_update = false;
        self.shadows_dirty = false;
    }

    /// Forces a full refresh of the light and its shadows on the next update.
    pub fn invalidate(&mut self) {
        self.mark_dirty(true);
    }

    // --- Slot lifecycle, driven by the registry ---

    /// The light table slot, when attached.
    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    /// Returns `true` if the light owns a slot.
    pub fn is_attached(&self) -> bool {
        self.slot.is_some()
    }

    /// Records the slot reserved for this light.
    pub fn assign_slot(&mut self, slot: usize) {
        self.slot = Some(slot);
    }

    /// Forgets the slot. Returns the slot that was held.
    pub fn remove_slot(&mut self) -> Option<usize> {
        self.slot.take()
    }

    /// Number of shadow sources this light needs (0 when it casts none).
    pub fn num_shadow_sources(&self) -> usize {
        if self.casts_shadows {
            self.kind.num_shadow_sources()
        } else {
            0
        }
    }

    /// The shadow-source slots owned by this light.
    pub fn shadow_sources(&self) -> Option<SourceRange> {
        self.shadow_sources
    }

    /// Records the shadow-source slots reserved for this light.
    pub fn set_shadow_sources(&mut self, range: SourceRange) {
        self.shadow_sources = Some(range);
    }

    /// Forgets the shadow-source slots, returning them.
    pub fn clear_shadow_sources(&mut self) -> Option<SourceRange> {
        self.shadow_sources.take()
    }

    /// Disables shadows on a light whose sources could not be allocated.
    pub fn disable_shadows(&mut self) {
        self.casts_shadows = false;
        self.shadow_sources = None;
        self.mark_dirty(true);
    }

    // --- Derived data ---

    /// Aims shadow face `face` of this light and sets its resolution.
    ///
    /// Returns `false` and leaves the source untouched when the kind has no
    /// such face.
    pub fn configure_shadow_source(&self, face: usize, source: &mut ShadowSource) -> bool {
        if face >= self.kind.num_shadow_sources() {
            log::error!(
                "Light: shadow face {face} out of range for a light with {} faces",
                self.kind.num_shadow_sources()
            );
            return false;
        }
        let (fov, direction) = self.kind.shadow_view(face);
        source.set_resolution(self.shadow_resolution);
        source.set_perspective_lens(
            fov,
            self.near_plane,
            self.kind.radius(),
            self.position,
            direction,
        )
    }

    /// Appends the light's operands (after the slot) to a `StoreLight` command.
    pub fn write_command(&self, cmd: &mut GpuCommand) -> Result<(), CommandError> {
        cmd.push_int(self.kind.type_tag())?;
        cmd.push_int(self.ies_profile.map_or(-1, |profile| profile as i32))?;
        cmd.push_int(self.shadow_sources.map_or(-1, |range| range.first as i32))?;
        cmd.push_vec3(self.position)?;
        cmd.push_vec3((self.color * self.intensity).to_vec3())?;
        self.kind.write_command(cmd)
    }
}
