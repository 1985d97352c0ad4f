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

//! Defines the LightShadowRegistry, the orchestrator of the light system.

use penumbra_core::{
    config::LightSystemConfig,
    error::{CommandError, ConfigError, LightError},
    math::Vec3,
    renderer::{
        command::{CommandType, GpuCommand},
        light::{Light, SourceRange},
        shadow::{ShadowSource, ShadowView},
        traits::ShadowRenderTarget,
    },
};
use penumbra_data::{CommandQueue, ShadowAtlas, SlotAllocator};
use penumbra_lanes::ShadowUpdateScheduler;

/// Identifies a light attached to a [`LightShadowRegistry`].
///
/// The generation changes every time the slot is vacated, so a handle kept
/// past [`LightShadowRegistry::remove_light`] never aliases a later light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightHandle {
    slot: usize,
    generation: u32,
}

impl LightHandle {
    /// The light table slot. This is the light index seen by the GPU.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The generation of the slot when the handle was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Summary of one [`LightShadowRegistry::update`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Dirty lights re-sent to the GPU.
    pub lights_refreshed: usize,
    /// Shadow sources redrawn this frame.
    pub sources_updated: usize,
    /// Atlas regions released from out-of-range sources.
    pub evicted: usize,
    /// Sources still waiting for an update.
    pub deferred: usize,
    /// Commands enqueued during the update.
    pub commands_queued: usize,
}

/// Owns every light and shadow source, schedules shadow updates and turns
/// state changes into GPU commands.
///
/// Lights live in a fixed-capacity slot table. A shadow-casting light also
/// owns a contiguous run of slots in the shadow-source table: one for a spot
/// light, six for a point light. Nothing reaches the GPU directly; every
/// change is queued as a [`GpuCommand`] and flushed by
/// [`process_commands`](Self::process_commands).
///
/// The registry is the owner of record for slots and source runs. The copies
/// stored on each [`Light`] are restored from it on every update.
pub struct LightShadowRegistry<T: ShadowRenderTarget = ShadowView> {
    lights: SlotAllocator<Light>,
    generations: Vec<u32>,
    /// Source run owned by each light slot.
    source_ranges: Vec<Option<SourceRange>>,
    sources: SlotAllocator<ShadowSource>,
    scheduler: ShadowUpdateScheduler<T>,
    commands: CommandQueue,
    camera_position: Vec3,
}

impl<T: ShadowRenderTarget + Default> LightShadowRegistry<T> {
    /// Creates an empty registry using default render targets.
    pub fn new(config: &LightSystemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = ShadowUpdateScheduler::new(config)?;
        Ok(Self::from_parts(config, scheduler))
    }
}

impl<T: ShadowRenderTarget> LightShadowRegistry<T> {
    /// Creates an empty registry driving the given render targets, one per
    /// allowed shadow update.
    pub fn with_render_targets(
        config: &LightSystemConfig,
        targets: Vec<T>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = ShadowUpdateScheduler::with_targets(config, targets)?;
        Ok(Self::from_parts(config, scheduler))
    }

    fn from_parts(config: &LightSystemConfig, scheduler: ShadowUpdateScheduler<T>) -> Self {
        log::info!(
            "LightShadowRegistry: {} light slots, {} shadow-source slots",
            config.max_lights,
            config.max_shadow_sources
        );
        Self {
            lights: SlotAllocator::new(config.max_lights),
            generations: vec![0; config.max_lights],
            source_ranges: vec![None; config.max_lights],
            sources: SlotAllocator::new(config.max_shadow_sources),
            scheduler,
            commands: CommandQueue::new(config.commands_per_frame),
            camera_position: Vec3::ZERO,
        }
    }

    // --- Attach / detach ---

    /// Attaches a light, reserving its slot and, when it casts shadows, a
    /// contiguous run of shadow-source slots.
    ///
    /// Running out of shadow-source slots does not fail the call: the light
    /// is attached with shadows disabled and a warning is logged.
    pub fn add_light(&mut self, mut light: Light) -> Result<LightHandle, LightError> {
        if let Some(slot) = light.slot() {
            log::error!("LightShadowRegistry: light is already attached to slot {slot}");
            return Err(LightError::AlreadyAttached(slot));
        }
        let Some(slot) = self.lights.find_slot() else {
            log::error!("LightShadowRegistry: light table is full ({} slots)", self.lights.capacity());
            return Err(LightError::NoFreeSlot);
        };

        if let Some(stale) = light.clear_shadow_sources() {
            log::warn!("LightShadowRegistry: dropping source run {stale:?} carried by a detached light");
        }
        light.assign_slot(slot);
        let wanted = light.num_shadow_sources();
        if wanted > 0 {
            match self.sources.find_consecutive_slots(wanted) {
                Some(first) => {
                    let range = SourceRange { first, count: wanted };
                    self.attach_sources(&light, range)?;
                    light.set_shadow_sources(range);
                }
                None => {
                    log::warn!(
                        "LightShadowRegistry: no run of {wanted} free shadow-source slots, light {slot} will not cast shadows"
                    );
                    light.disable_shadows();
                }
            }
        }

        let command = store_light_command(slot, &light)?;
        light.mark_clean();
        self.source_ranges[slot] = light.shadow_sources();
        self.lights.reserve_slot(slot, light)?;
        self.commands.enqueue(command);

        log::debug!("LightShadowRegistry: attached light {slot}");
        Ok(LightHandle {
            slot,
            generation: self.generations[slot],
        })
    }

    fn attach_sources(&mut self, light: &Light, range: SourceRange) -> Result<(), LightError> {
        for (face, slot) in range.slots().enumerate() {
            let mut source = ShadowSource::new();
            source.set_slot(slot);
            light.configure_shadow_source(face, &mut source);
            self.sources.reserve_slot(slot, source)?;
        }
        Ok(())
    }

    /// Detaches a light, releasing its slot, its shadow sources and their
    /// atlas regions. Returns the light, detached and ready to be re-added.
    pub fn remove_light(&mut self, handle: LightHandle) -> Result<Light, LightError> {
        if !self.contains(handle) {
            log::error!("LightShadowRegistry: remove_light on a detached light {handle:?}");
            return Err(LightError::NotAttached);
        }
        let slot = handle.slot;
        let mut light = self.lights.free_slot(slot)?;
        self.generations[slot] = self.generations[slot].wrapping_add(1);

        let mut command = GpuCommand::new(CommandType::RemoveLight);
        command.push_int(slot as i32)?;
        self.commands.enqueue(command);

        light.clear_shadow_sources();
        if let Some(range) = self.source_ranges[slot].take() {
            for mut source in self.sources.free_consecutive_slots(range.first, range.count) {
                self.scheduler.release_source(&mut source);
            }
            let mut command = GpuCommand::new(CommandType::RemoveSources);
            command.push_int(range.first as i32)?;
            command.push_int(range.count as i32)?;
            self.commands.enqueue(command);
        }

        light.remove_slot();
        light.invalidate();
        log::debug!("LightShadowRegistry: detached light {slot}");
        Ok(light)
    }

    /// Returns `true` if `handle` refers to a light that is still attached.
    pub fn contains(&self, handle: LightHandle) -> bool {
        self.lights.is_occupied(handle.slot)
            && self.generations.get(handle.slot) == Some(&handle.generation)
    }

    // --- Per-frame ---

    /// Sets the camera position used to score and range-test shadow sources.
    pub fn set_camera_position(&mut self, position: Vec3) {
        self.camera_position = position;
    }

    /// The camera position used by the next update.
    pub fn camera_position(&self) -> Vec3 {
        self.camera_position
    }

    /// Runs one frame: re-sends dirty lights, schedules shadow updates and
    /// queues a `StoreSource` command for every source redrawn.
    pub fn update(&mut self) -> FrameReport {
        let mut report = FrameReport::default();
        let queued_before = self.commands.len();

        for (slot, light) in self.lights.iter_mut() {
            let owned = self.source_ranges[slot];
            if light.slot() != Some(slot) || light.shadow_sources() != owned {
                log::warn!("LightShadowRegistry: restoring slot bookkeeping of light {slot}");
                light.assign_slot(slot);
                match owned {
                    Some(range) => light.set_shadow_sources(range),
                    None => {
                        light.clear_shadow_sources();
                    }
                }
                light.invalidate();
            }
            if !light.needs_update() {
                continue;
            }
            if light.shadows_dirty() {
                if let Some(range) = owned {
                    let faces = light.kind().num_shadow_sources();
                    if faces != range.count {
                        log::error!(
                            "LightShadowRegistry: light {slot} has {faces} shadow faces but owns {} sources",
                            range.count
                        );
                    }
                    for (face, source_slot) in range.slots().take(faces).enumerate() {
                        if let Some(source) = self.sources.get_mut(source_slot) {
                            light.configure_shadow_source(face, source);
                        }
                    }
                }
            }
            match store_light_command(slot, light) {
                Ok(command) => self.commands.enqueue(command),
                Err(err) => log::error!("LightShadowRegistry: light {slot}: {err}"),
            }
            light.mark_clean();
            report.lights_refreshed += 1;
        }

        let schedule = self
            .scheduler
            .schedule(&mut self.sources, self.camera_position);
        for &slot in &schedule.updated {
            let Some(source) = self.sources.get(slot) else {
                continue;
            };
            match store_source_command(slot, source) {
                Ok(command) => self.commands.enqueue(command),
                Err(err) => log::error!("LightShadowRegistry: shadow source {slot}: {err}"),
            }
        }

        report.sources_updated = schedule.updated.len();
        report.evicted = schedule.evicted;
        report.deferred = schedule.deferred;
        report.commands_queued = self.commands.len() - queued_before;
        log::trace!("LightShadowRegistry: {report:?}");
        report
    }

    /// Flushes up to `commands_per_frame` queued commands into `dest`.
    /// Returns the number of commands written.
    pub fn process_commands(&mut self, dest: &mut [f32]) -> usize {
        self.commands.process(dest)
    }

    // --- Introspection ---

    /// The light behind `handle`, if it is still attached.
    pub fn light(&self, handle: LightHandle) -> Option<&Light> {
        if !self.contains(handle) {
            return None;
        }
        self.lights.get(handle.slot)
    }

    /// Mutable access to the light behind `handle`. Changes are sent on the
    /// next [`update`](Self::update).
    pub fn light_mut(&mut self, handle: LightHandle) -> Option<&mut Light> {
        if !self.contains(handle) {
            return None;
        }
        self.lights.get_mut(handle.slot)
    }

    /// Iterates the attached lights in slot order.
    pub fn iter_lights(&self) -> impl Iterator<Item = (LightHandle, &Light)> + '_ {
        self.lights.iter().map(|(slot, light)| {
            let handle = LightHandle {
                slot,
                generation: self.generations[slot],
            };
            (handle, light)
        })
    }

    /// The shadow source in `slot`, if reserved.
    pub fn shadow_source(&self, slot: usize) -> Option<&ShadowSource> {
        self.sources.get(slot)
    }

    /// Number of attached lights.
    pub fn num_lights(&self) -> usize {
        self.lights.len()
    }

    /// Number of reserved shadow sources.
    pub fn num_shadow_sources(&self) -> usize {
        self.sources.len()
    }

    /// Highest occupied light slot.
    pub fn max_light_index(&self) -> Option<usize> {
        self.lights.max_index()
    }

    /// One past the highest occupied light slot, or 0 when empty. GPU
    /// consumers iterate lights up to this bound.
    pub fn light_index_bound(&self) -> usize {
        self.lights.index_bound()
    }

    /// The shadow atlas.
    pub fn atlas(&self) -> &ShadowAtlas {
        self.scheduler.atlas()
    }

    /// The shadow update scheduler.
    pub fn scheduler(&self) -> &ShadowUpdateScheduler<T> {
        &self.scheduler
    }

    /// The pending GPU commands.
    pub fn commands(&self) -> &CommandQueue {
        &self.commands
    }
}

fn store_light_command(slot: usize, light: &Light) -> Result<GpuCommand, CommandError> {
    let mut command = GpuCommand::new(CommandType::StoreLight);
    command.push_int(slot as i32)?;
    light.write_command(&mut command)?;
    Ok(command)
}

fn store_source_command(slot: usize, source: &ShadowSource) -> Result<GpuCommand, CommandError> {
    let mut command = GpuCommand::new(CommandType::StoreSource);
    command.push_int(slot as i32)?;
    source.write_command(&mut command)?;
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LightSystemConfig {
        LightSystemConfig {
            max_lights: 2,
            max_shadow_sources: 2,
            atlas_size: 128,
            max_shadow_updates: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_generation_advances_on_removal() {
        let mut registry = LightShadowRegistry::<ShadowView>::new(&config()).unwrap();
        let first = registry.add_light(Light::point(1.0)).unwrap();
        assert_eq!(first.generation(), 0);
        registry.remove_light(first).unwrap();

        let second = registry.add_light(Light::point(1.0)).unwrap();
        assert_eq!(second.slot(), first.slot());
        assert_eq!(second.generation(), 1);
        assert!(!registry.contains(first));
    }

    #[test]
    fn test_custom_render_targets_are_driven() {
        let targets = vec![ShadowView::default()];
        let mut registry = LightShadowRegistry::with_render_targets(&config(), targets).unwrap();
        let mut light = Light::spot(5.0, 0.5, Vec3::new(0.0, 0.0, -1.0));
        light.set_shadow_map_resolution(32);
        light.set_casts_shadows(true).unwrap();
        registry.add_light(light).unwrap();

        registry.update();
        let target = &registry.scheduler().targets()[0];
        assert!(target.active);
        assert_eq!(target.viewport, registry.shadow_source(0).unwrap().uv_region());
        assert_eq!(
            &target.view_projection,
            registry.shadow_source(0).unwrap().view_projection()
        );
    }
}
