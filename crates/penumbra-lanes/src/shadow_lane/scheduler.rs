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

//! Per-frame selection of the shadow maps to redraw.

use penumbra_core::config::LightSystemConfig;
use penumbra_core::error::ConfigError;
use penumbra_core::math::Vec3;
use penumbra_core::renderer::shadow::{AtlasRegion, ShadowSource, ShadowView};
use penumbra_core::renderer::traits::ShadowRenderTarget;
use penumbra_data::{ShadowAtlas, SlotAllocator};

/// Outcome of one [`ShadowUpdateScheduler::schedule`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Slots of the sources redrawn this frame, in render-target order.
    pub updated: Vec<usize>,
    /// Number of atlas regions released from out-of-range sources.
    pub evicted: usize,
    /// Number of in-range sources that still need an update afterwards.
    pub deferred: usize,
}

/// Picks at most `max_updates` shadow sources to redraw each frame and
/// hands each one an atlas region and a render target.
///
/// The scheduler owns the [`ShadowAtlas`] and a fixed pool of render
/// targets, one per possible update. Sources farther than the update
/// distance lose their region. Among the rest, sources that need an update
/// are scored by camera distance, with a large bonus for already holding a
/// region so resident shadow maps are not thrown out for marginal gains.
pub struct ShadowUpdateScheduler<T: ShadowRenderTarget = ShadowView> {
    atlas: ShadowAtlas,
    targets: Vec<T>,
    max_updates: usize,
    update_distance: f32,
    resident_bonus: f64,
}

impl<T: ShadowRenderTarget + Default> ShadowUpdateScheduler<T> {
    /// Creates a scheduler with `max_shadow_updates` default render targets.
    pub fn new(config: &LightSystemConfig) -> Result<Self, ConfigError> {
        let targets = (0..config.max_shadow_updates)
            .map(|_| T::default())
            .collect();
        Self::with_targets(config, targets)
    }
}

impl<T: ShadowRenderTarget> ShadowUpdateScheduler<T> {
    /// Creates a scheduler driving the given render targets.
    ///
    /// There must be exactly one target per allowed update.
    pub fn with_targets(config: &LightSystemConfig, mut targets: Vec<T>) -> Result<Self, ConfigError> {
        if targets.len() != config.max_shadow_updates {
            return Err(ConfigError::RenderTargetCount {
                expected: config.max_shadow_updates,
                actual: targets.len(),
            });
        }
        let atlas = ShadowAtlas::from_config(config)?;
        if config.max_shadow_updates == 0 {
            log::warn!("ShadowUpdateScheduler: max_shadow_updates is 0, shadow maps will never update");
        }
        for target in &mut targets {
            target.set_active(false);
        }
        log::info!(
            "ShadowUpdateScheduler: {}x{} tile atlas, {} updates per frame",
            atlas.num_tiles(),
            atlas.num_tiles(),
            config.max_shadow_updates
        );

        Ok(Self {
            atlas,
            targets,
            max_updates: config.max_shadow_updates,
            update_distance: config.shadow_update_distance,
            resident_bonus: config.resident_score_bonus as f64,
        })
    }

    /// The shadow atlas.
    pub fn atlas(&self) -> &ShadowAtlas {
        &self.atlas
    }

    /// The render targets, one per allowed update.
    pub fn targets(&self) -> &[T] {
        &self.targets
    }

    /// Mutable access to the render targets, for backends that own GPU state in them.
    pub fn targets_mut(&mut self) -> &mut [T] {
        &mut self.targets
    }

    /// Number of targets rendering this frame.
    pub fn num_active_targets(&self) -> usize {
        self.targets.iter().filter(|t| t.is_active()).count()
    }

    /// Maximum number of shadow maps redrawn per frame.
    pub fn max_updates(&self) -> usize {
        self.max_updates
    }

    /// Distance beyond which sources are not updated and lose their region.
    pub fn update_distance(&self) -> f32 {
        self.update_distance
    }

    /// Frees the atlas region held by `source`, if any.
    pub fn release_source(&mut self, source: &mut ShadowSource) {
        if let Some(region) = source.take_region() {
            self.free_region(region);
        }
    }

    fn free_region(&mut self, region: AtlasRegion) {
        if let Err(err) = self.atlas.free_region(region) {
            log::error!("ShadowUpdateScheduler: failed to free {region:?}: {err}");
        }
    }

    /// Runs one scheduling pass over every source in `sources`.
    ///
    /// Selected sources get a region and a render target and have their
    /// update flag cleared. Sources that miss out keep their flag and are
    /// retried next frame.
    ///
    /// # Panics
    ///
    /// Panics if more than `max_updates` render targets end up active.
    pub fn schedule(
        &mut self,
        sources: &mut SlotAllocator<ShadowSource>,
        camera_position: Vec3,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        let mut candidates: Vec<(f64, usize)> = Vec::new();
        for (slot, source) in sources.iter_mut() {
            let bounds = *source.bounds();
            if bounds.surface_distance(camera_position) >= self.update_distance {
                if let Some(region) = source.take_region() {
                    self.free_region(region);
                    report.evicted += 1;
                }
                continue;
            }
            if !source.needs_update() {
                continue;
            }

            let mut score = -(bounds.center.distance(camera_position) as f64);
            if source.has_region() {
                score += self.resident_bonus;
            }
            candidates.push((score, slot));
        }

        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        let selected = candidates.len().min(self.max_updates);
        report.deferred = candidates.len() - selected;

        // Free regions whose size no longer matches before reserving anything,
        // so the space is available to this frame's reservations.
        let mut planned = Vec::with_capacity(selected);
        for &(_, slot) in &candidates[..selected] {
            let Some(source) = sources.get_mut(slot) else {
                continue;
            };
            let tiles = match self.atlas.get_required_tiles(source.resolution()) {
                Ok(tiles) => Some(tiles),
                Err(err) => {
                    log::warn!("ShadowUpdateScheduler: skipping source {slot}: {err}");
                    None
                }
            };
            if source
                .region()
                .is_some_and(|region| Some(region.w) != tiles || region.h != region.w)
            {
                self.release_source(source);
            }
            planned.push((slot, tiles));
        }

        let mut next_target = 0;
        for (slot, tiles) in planned {
            let Some(tiles) = tiles else {
                report.deferred += 1;
                continue;
            };
            let Some(source) = sources.get_mut(slot) else {
                continue;
            };

            if !source.has_region() {
                let Some(region) = self.atlas.find_and_reserve_region(tiles, tiles) else {
                    report.deferred += 1;
                    continue;
                };
                let uv = self.atlas.region_to_uv(&region);
                source.set_region(region, uv);
            }

            source.set_needs_update(false);
            source.apply_to(&mut self.targets[next_target]);
            next_target += 1;
            report.updated.push(slot);
        }

        for target in &mut self.targets[next_target..] {
            target.set_active(false);
        }
        let active = self.num_active_targets();
        assert!(
            active <= self.max_updates,
            "{active} shadow render targets active, limit is {}",
            self.max_updates
        );

        log::trace!(
            "ShadowUpdateScheduler: {} updated, {} evicted, {} deferred",
            report.updated.len(),
            report.evicted,
            report.deferred
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::renderer::shadow::BoundingSphere;

    fn config(max_updates: usize) -> LightSystemConfig {
        LightSystemConfig {
            atlas_size: 256,
            atlas_tile_size: 32,
            max_shadow_updates: max_updates,
            shadow_update_distance: 100.0,
            ..Default::default()
        }
    }

    fn source_at(x: f32, resolution: u32) -> ShadowSource {
        let mut source = ShadowSource::new();
        source.set_resolution(resolution);
        source.set_bounds(BoundingSphere::new(Vec3::new(x, 0.0, 0.0), 0.5));
        source
    }

    fn table(distances: &[f32]) -> SlotAllocator<ShadowSource> {
        let mut sources = SlotAllocator::new(16);
        for (slot, d) in distances.iter().enumerate() {
            let mut source = source_at(*d, 32);
            source.set_slot(slot);
            sources.reserve_slot(slot, source).unwrap();
        }
        sources
    }

    #[test]
    fn test_selects_closest_within_budget() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(2)).unwrap();
        let mut sources = table(&[10.0, 20.0, 5.0, 50.0, 1.0]);

        let report = scheduler.schedule(&mut sources, Vec3::ZERO);

        assert_eq!(report.updated, vec![4, 2]);
        assert_eq!(report.deferred, 3);
        assert!(!sources.get(4).unwrap().needs_update());
        assert!(!sources.get(2).unwrap().needs_update());
        assert!(sources.get(0).unwrap().needs_update());
        assert_eq!(scheduler.num_active_targets(), 2);
        assert_eq!(
            scheduler.targets()[0].viewport,
            sources.get(4).unwrap().uv_region()
        );
    }

    #[test]
    fn test_budget_drains_over_frames() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(2)).unwrap();
        let mut sources = table(&[10.0, 20.0, 5.0, 50.0, 1.0]);

        scheduler.schedule(&mut sources, Vec3::ZERO);
        let second = scheduler.schedule(&mut sources, Vec3::ZERO);
        assert_eq!(second.updated, vec![0, 1]);
        let third = scheduler.schedule(&mut sources, Vec3::ZERO);
        assert_eq!(third.updated, vec![3]);
        assert_eq!(third.deferred, 0);
        assert_eq!(scheduler.num_active_targets(), 1);

        let idle = scheduler.schedule(&mut sources, Vec3::ZERO);
        assert!(idle.updated.is_empty());
        assert_eq!(scheduler.num_active_targets(), 0);
    }

    #[test]
    fn test_resident_source_beats_closer_newcomer() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(1)).unwrap();
        let mut sources = table(&[30.0]);
        scheduler.schedule(&mut sources, Vec3::ZERO);

        let mut newcomer = source_at(2.0, 32);
        newcomer.set_slot(1);
        sources.reserve_slot(1, newcomer).unwrap();
        sources.get_mut(0).unwrap().set_needs_update(true);

        let report = scheduler.schedule(&mut sources, Vec3::ZERO);
        assert_eq!(report.updated, vec![0]);
        assert_eq!(report.deferred, 1);
    }

    #[test]
    fn test_resident_source_is_redrawn_in_place() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(2)).unwrap();
        let mut sources = table(&[3.0, 4.0]);
        scheduler.schedule(&mut sources, Vec3::ZERO);
        let before = sources.get(1).unwrap().region();

        sources.get_mut(1).unwrap().set_needs_update(true);
        let report = scheduler.schedule(&mut sources, Vec3::ZERO);

        assert_eq!(report.updated, vec![1]);
        assert_eq!(sources.get(1).unwrap().region(), before);
        assert_eq!(scheduler.atlas().num_used_tiles(), 2);
    }

    #[test]
    fn test_resolution_change_reallocates() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(2)).unwrap();
        let mut sources = table(&[3.0]);
        scheduler.schedule(&mut sources, Vec3::ZERO);

        sources.get_mut(0).unwrap().set_resolution(64);
        scheduler.schedule(&mut sources, Vec3::ZERO);

        let region = sources.get(0).unwrap().region().unwrap();
        assert_eq!((region.w, region.h), (2, 2));
        assert_eq!(scheduler.atlas().num_used_tiles(), 4);
    }

    #[test]
    fn test_out_of_range_sources_are_evicted() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(4)).unwrap();
        let mut sources = table(&[3.0, 60.0]);
        scheduler.schedule(&mut sources, Vec3::ZERO);
        assert_eq!(scheduler.atlas().num_used_tiles(), 2);

        let report = scheduler.schedule(&mut sources, Vec3::new(150.0, 0.0, 0.0));
        assert_eq!(report.evicted, 1);
        assert!(!sources.get(0).unwrap().has_region());
        assert!(sources.get(1).unwrap().has_region());
        assert_eq!(scheduler.atlas().num_used_tiles(), 1);
    }

    #[test]
    fn test_atlas_exhaustion_defers() {
        let config = LightSystemConfig {
            atlas_size: 64,
            ..config(2)
        };
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config).unwrap();
        let mut sources = SlotAllocator::new(4);
        sources.reserve_slot(0, source_at(1.0, 64)).unwrap();
        sources.reserve_slot(1, source_at(2.0, 64)).unwrap();

        let report = scheduler.schedule(&mut sources, Vec3::ZERO);
        assert_eq!(report.updated, vec![0]);
        assert_eq!(report.deferred, 1);
        assert!(sources.get(1).unwrap().needs_update());
        assert!(!sources.get(1).unwrap().has_region());
        assert_eq!(scheduler.num_active_targets(), 1);
    }

    #[test]
    fn test_invalid_resolution_is_skipped() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(2)).unwrap();
        let mut sources = SlotAllocator::new(2);
        sources.reserve_slot(0, source_at(1.0, 48)).unwrap();

        let report = scheduler.schedule(&mut sources, Vec3::ZERO);
        assert!(report.updated.is_empty());
        assert_eq!(report.deferred, 1);
        assert!(sources.get(0).unwrap().needs_update());
    }

    #[test]
    fn test_zero_budget_freezes_shadows() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(0)).unwrap();
        let mut sources = table(&[1.0, 2.0]);

        let report = scheduler.schedule(&mut sources, Vec3::ZERO);
        assert!(report.updated.is_empty());
        assert_eq!(report.deferred, 2);
        assert_eq!(scheduler.atlas().num_used_tiles(), 0);
    }

    #[test]
    fn test_target_count_must_match_budget() {
        let result = ShadowUpdateScheduler::with_targets(&config(3), vec![ShadowView::default()]);
        assert!(matches!(
            result,
            Err(ConfigError::RenderTargetCount {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_release_source_frees_region() {
        let mut scheduler = ShadowUpdateScheduler::<ShadowView>::new(&config(1)).unwrap();
        let mut sources = table(&[1.0]);
        scheduler.schedule(&mut sources, Vec3::ZERO);

        let source = sources.get_mut(0).unwrap();
        scheduler.release_source(source);
        assert!(!source.has_region());
        assert_eq!(scheduler.atlas().num_used_tiles(), 0);
    }
}
