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

//! The shadow atlas: a 2D bin-packing allocator over a square tile grid.

use penumbra_core::config::{LightSystemConfig, MAX_ATLAS_TILES};
use penumbra_core::error::{AtlasError, ConfigError};
use penumbra_core::renderer::shadow::{AtlasRegion, UvRect};

/// Tracks which tiles of the shared shadow atlas texture are in use.
///
/// Regions are found first-fit in row-major order starting at the top-left
/// tile. There is no compaction: a region stays where it was placed until it
/// is freed, and reserved regions never overlap.
#[derive(Debug, Clone)]
pub struct ShadowAtlas {
    size: u32,
    tile_size: u32,
    num_tiles: u32,
    /// Row-major occupancy, `num_tiles * num_tiles` entries.
    flags: Vec<bool>,
    num_used_tiles: u32,
}

impl ShadowAtlas {
    /// Creates an empty atlas of `size` texels split into `tile_size` tiles.
    pub fn new(size: u32, tile_size: u32) -> Result<Self, ConfigError> {
        if tile_size == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        if size == 0 || size % tile_size != 0 {
            return Err(ConfigError::AtlasNotDivisible {
                atlas_size: size,
                tile_size,
            });
        }
        let num_tiles = size / tile_size;
        if num_tiles > MAX_ATLAS_TILES {
            return Err(ConfigError::TooLarge {
                field: "atlas_size / atlas_tile_size",
                value: num_tiles as usize,
                max: MAX_ATLAS_TILES as usize,
            });
        }
        let side = num_tiles as usize;
        Ok(Self {
            size,
            tile_size,
            num_tiles,
            flags: vec![false; side * side],
            num_used_tiles: 0,
        })
    }

    /// Creates the atlas described by a light system configuration.
    pub fn from_config(config: &LightSystemConfig) -> Result<Self, ConfigError> {
        Self::new(config.atlas_size, config.atlas_tile_size)
    }

    /// Side length of the atlas in texels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Side length of one tile in texels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Tiles per atlas side.
    pub fn num_tiles(&self) -> u32 {
        self.num_tiles
    }

    /// Number of tiles currently reserved.
    pub fn num_used_tiles(&self) -> u32 {
        self.num_used_tiles
    }

    /// Fraction of tiles currently reserved, in `[0, 1]`.
    pub fn coverage(&self) -> f32 {
        self.num_used_tiles as f32 / self.flags.len() as f32
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.num_tiles as usize + x as usize
    }

    /// Returns `true` if tile `(x, y)` is reserved. Out-of-grid tiles read as free.
    pub fn is_tile_used(&self, x: u32, y: u32) -> bool {
        x < self.num_tiles && y < self.num_tiles && self.flags[self.index(x, y)]
    }

    fn check_bounds(&self, region: &AtlasRegion) -> Result<(), AtlasError> {
        let fits = |start: u32, extent: u32| {
            start
                .checked_add(extent)
                .is_some_and(|end| end <= self.num_tiles)
        };
        if fits(region.x, region.w) && fits(region.y, region.h) {
            Ok(())
        } else {
            Err(AtlasError::OutOfBounds {
                x: region.x,
                y: region.y,
                w: region.w,
                h: region.h,
                tiles: self.num_tiles,
            })
        }
    }

    /// Converts a shadow map resolution into a tile count per side.
    pub fn get_required_tiles(&self, resolution: u32) -> Result<u32, AtlasError> {
        if resolution == 0 || resolution % self.tile_size != 0 {
            return Err(AtlasError::InvalidResolution {
                resolution,
                tile_size: self.tile_size,
            });
        }
        Ok(resolution / self.tile_size)
    }

    /// Returns `true` if every tile of the `w` x `h` rect at `(x, y)` is free
    /// and the rect lies inside the grid.
    pub fn region_is_free(&self, x: u32, y: u32, w: u32, h: u32) -> bool {
        let region = AtlasRegion::new(x, y, w, h);
        if self.check_bounds(&region).is_err() {
            return false;
        }
        (y..y + h).all(|row| {
            let start = self.index(x, row);
            self.flags[start..start + w as usize].iter().all(|used| !used)
        })
    }

    /// Writes `used` over the region and returns how many tiles changed.
    fn set_region(&mut self, region: &AtlasRegion, used: bool) -> u32 {
        let mut changed = 0;
        for row in region.y..region.y + region.h {
            let start = self.index(region.x, row);
            for flag in &mut self.flags[start..start + region.w as usize] {
                if *flag != used {
                    *flag = used;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Finds the first free `w` x `h` rect in row-major order and reserves it.
    ///
    /// Returns `None` when no rect fits. That is a soft miss: the caller skips
    /// the work this frame and retries later.
    pub fn find_and_reserve_region(&mut self, w: u32, h: u32) -> Option<AtlasRegion> {
        if w == 0 || h == 0 || w > self.num_tiles || h > self.num_tiles {
            return None;
        }
        for y in 0..=self.num_tiles - h {
            for x in 0..=self.num_tiles - w {
                if self.region_is_free(x, y, w, h) {
                    let region = AtlasRegion::new(x, y, w, h);
                    self.num_used_tiles += self.set_region(&region, true);
                    return Some(region);
                }
            }
        }
        log::warn!("ShadowAtlas: no free region of {w}x{h} tiles");
        None
    }

    /// Releases a region previously returned by
    /// [`find_and_reserve_region`](Self::find_and_reserve_region).
    ///
    /// Only tiles that were reserved are counted back, so freeing a region
    /// twice leaves the usage count intact.
    pub fn free_region(&mut self, region: AtlasRegion) -> Result<(), AtlasError> {
        self.check_bounds(&region)?;
        let released = self.set_region(&region, false);
        if released != region.area() {
            log::warn!(
                "ShadowAtlas: freed {region:?} but only {released} of its {} tiles were reserved",
                region.area()
            );
        }
        self.num_used_tiles -= released;
        Ok(())
    }

    /// Maps a tile region to normalized texture coordinates.
    pub fn region_to_uv(&self, region: &AtlasRegion) -> UvRect {
        let scale = self.tile_size as f32 / self.size as f32;
        UvRect::new(
            region.x as f32 * scale,
            region.y as f32 * scale,
            region.w as f32 * scale,
            region.h as f32 * scale,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas_8x8() -> ShadowAtlas {
        ShadowAtlas::new(256, 32).unwrap()
    }

    #[test]
    fn test_non_divisible_size_is_a_config_error() {
        assert!(matches!(
            ShadowAtlas::new(1000, 64),
            Err(ConfigError::AtlasNotDivisible { .. })
        ));
        assert_eq!(ShadowAtlas::new(1024, 0).unwrap_err(), ConfigError::ZeroTileSize);
    }

    #[test]
    fn test_required_tiles() {
        let atlas = atlas_8x8();
        assert_eq!(atlas.get_required_tiles(64), Ok(2));
        assert_eq!(
            atlas.get_required_tiles(48),
            Err(AtlasError::InvalidResolution {
                resolution: 48,
                tile_size: 32
            })
        );
    }

    #[test]
    fn test_second_region_does_not_overlap_first() {
        let mut atlas = atlas_8x8();
        let first = atlas.find_and_reserve_region(2, 2).unwrap();
        assert_eq!(first, AtlasRegion::new(0, 0, 2, 2));
        let second = atlas.find_and_reserve_region(2, 2).unwrap();
        assert_eq!(second, AtlasRegion::new(2, 0, 2, 2));
        assert_eq!(atlas.num_used_tiles(), 8);
    }

    #[test]
    fn test_row_major_wraps_to_next_row() {
        let mut atlas = atlas_8x8();
        atlas.find_and_reserve_region(6, 2).unwrap();
        // 3 wide does not fit in the remaining 2 columns of the first rows.
        let region = atlas.find_and_reserve_region(3, 3).unwrap();
        assert_eq!(region, AtlasRegion::new(0, 2, 3, 3));
        let narrow = atlas.find_and_reserve_region(2, 2).unwrap();
        assert_eq!(narrow, AtlasRegion::new(6, 0, 2, 2));
    }

    #[test]
    fn test_exhaustion_is_a_soft_miss() {
        let mut atlas = atlas_8x8();
        assert!(atlas.find_and_reserve_region(8, 8).is_some());
        assert!(atlas.find_and_reserve_region(1, 1).is_none());
        assert!(atlas.find_and_reserve_region(9, 1).is_none());
        assert!(atlas.find_and_reserve_region(0, 1).is_none());
        assert_eq!(atlas.coverage(), 1.0);
    }

    #[test]
    fn test_reserve_then_free_round_trip() {
        let mut atlas = atlas_8x8();
        atlas.find_and_reserve_region(3, 1).unwrap();
        atlas.find_and_reserve_region(1, 4).unwrap();
        let before = atlas.flags.clone();
        let used_before = atlas.num_used_tiles();

        let region = atlas.find_and_reserve_region(4, 4).unwrap();
        assert_ne!(atlas.flags, before);
        atlas.free_region(region).unwrap();

        assert_eq!(atlas.flags, before);
        assert_eq!(atlas.num_used_tiles(), used_before);
    }

    #[test]
    fn test_free_out_of_bounds_is_rejected() {
        let mut atlas = atlas_8x8();
        let err = atlas.free_region(AtlasRegion::new(7, 0, 2, 1)).unwrap_err();
        assert!(matches!(err, AtlasError::OutOfBounds { tiles: 8, .. }));
    }

    #[test]
    fn test_held_regions_never_overlap() {
        let mut atlas = ShadowAtlas::new(512, 32).unwrap();
        let mut held: Vec<AtlasRegion> = Vec::new();
        let sizes = [1, 2, 4, 3, 1, 2, 5, 1, 2, 4, 2, 1, 3, 3, 2];
        for (i, size) in sizes.iter().enumerate() {
            if let Some(region) = atlas.find_and_reserve_region(*size, *size) {
                held.push(region);
            }
            if i % 4 == 3 {
                let victim = held.remove(i % held.len());
                atlas.free_region(victim).unwrap();
            }
        }
        for (i, a) in held.iter().enumerate() {
            for b in &held[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
        let expected: u32 = held.iter().map(AtlasRegion::area).sum();
        assert_eq!(atlas.num_used_tiles(), expected);
    }

    #[test]
    fn test_double_free_keeps_usage_count() {
        let mut atlas = atlas_8x8();
        let kept = atlas.find_and_reserve_region(2, 2).unwrap();
        let freed = atlas.find_and_reserve_region(2, 2).unwrap();

        atlas.free_region(freed).unwrap();
        atlas.free_region(freed).unwrap();
        assert_eq!(atlas.num_used_tiles(), kept.area());

        // Overlaps the kept region by half: only the kept tiles count.
        atlas.free_region(AtlasRegion::new(1, 0, 2, 2)).unwrap();
        assert_eq!(atlas.num_used_tiles(), 2);
        assert!(atlas.region_is_free(1, 0, 2, 2));
    }

    #[test]
    fn test_tile_grid_is_bounded() {
        assert!(matches!(
            ShadowAtlas::new(65536, 1),
            Err(ConfigError::TooLarge { .. })
        ));
        let largest = ShadowAtlas::new(MAX_ATLAS_TILES * 4, 4).unwrap();
        assert_eq!(largest.num_tiles(), MAX_ATLAS_TILES);
    }

    #[test]
    fn test_region_to_uv() {
        let atlas = atlas_8x8();
        let uv = atlas.region_to_uv(&AtlasRegion::new(2, 4, 2, 1));
        assert_eq!(uv, UvRect::new(0.25, 0.5, 0.25, 0.125));
    }
}
