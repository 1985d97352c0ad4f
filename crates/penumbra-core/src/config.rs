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

//! Construction-time configuration of the light system.
//!
//! The configuration is fixed once the registry is built. Changing the atlas
//! size means building a new registry.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Capacities, atlas geometry and per-frame budgets of the light system.
///
/// Deserializable from RON; any field left out takes its default.
///
/// ```
/// use penumbra_core::config::LightSystemConfig;
///
/// let config = LightSystemConfig::from_ron_str("(atlas_size: 2048, max_shadow_updates: 4)").unwrap();
/// assert_eq!(config.atlas_size, 2048);
/// assert_eq!(config.atlas_tile_size, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSystemConfig {
    /// Capacity of the light table.
    pub max_lights: usize,
    /// Capacity of the shadow-source table.
    pub max_shadow_sources: usize,
    /// Side length of the square shadow atlas in texels.
    pub atlas_size: u32,
    /// Side length of one atlas tile in texels.
    pub atlas_tile_size: u32,
    /// Maximum number of shadow maps redrawn per frame. Zero freezes shadows.
    pub max_shadow_updates: usize,
    /// Sources farther than this from the camera are not updated and lose
    /// their atlas region.
    pub shadow_update_distance: f32,
    /// Maximum number of GPU commands flushed per frame.
    pub commands_per_frame: usize,
    /// Score bonus given to sources that already hold an atlas region.
    pub resident_score_bonus: f32,
}

impl Default for LightSystemConfig {
    fn default() -> Self {
        Self {
            max_lights: 65535,
            max_shadow_sources: 2048,
            atlas_size: 4096,
            atlas_tile_size: 32,
            max_shadow_updates: 10,
            shadow_update_distance: 100.0,
            commands_per_frame: 1024,
            resident_score_bonus: 1e10,
        }
    }
}

/// Largest slot count encodable in a command. Indices are stored as `f32`,
/// which holds every integer up to 2^24 exactly.
pub const MAX_GPU_INDEX_COUNT: usize = 1 << 24;

/// Largest number of tiles per atlas side.
pub const MAX_ATLAS_TILES: u32 = 1 << 12;

impl LightSystemConfig {
    /// Parses a configuration from RON text and validates it.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Number of tiles along one side of the atlas.
    pub fn atlas_tiles(&self) -> u32 {
        self.atlas_size / self.atlas_tile_size.max(1)
    }

    /// Rejects configurations the light system cannot be built from.
    ///
    /// `max_shadow_updates == 0` is accepted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.atlas_tile_size == 0 {
            return Err(ConfigError::ZeroTileSize);
        }
        if self.atlas_size == 0 || self.atlas_size % self.atlas_tile_size != 0 {
            return Err(ConfigError::AtlasNotDivisible {
                atlas_size: self.atlas_size,
                tile_size: self.atlas_tile_size,
            });
        }
        if self.atlas_tiles() > MAX_ATLAS_TILES {
            return Err(ConfigError::TooLarge {
                field: "atlas_size / atlas_tile_size",
                value: self.atlas_tiles() as usize,
                max: MAX_ATLAS_TILES as usize,
            });
        }
        for (field, value) in [
            ("max_lights", self.max_lights),
            ("max_shadow_sources", self.max_shadow_sources),
        ] {
            if value > MAX_GPU_INDEX_COUNT {
                return Err(ConfigError::TooLarge {
                    field,
                    value,
                    max: MAX_GPU_INDEX_COUNT,
                });
            }
        }
        if self.max_lights == 0 {
            return Err(ConfigError::ZeroCapacity("max_lights"));
        }
        if self.max_shadow_sources == 0 {
            return Err(ConfigError::ZeroCapacity("max_shadow_sources"));
        }
        if self.commands_per_frame == 0 {
            return Err(ConfigError::ZeroCapacity("commands_per_frame"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = LightSystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.atlas_tiles(), 128);
    }

    #[test]
    fn test_non_divisible_atlas_is_rejected() {
        let config = LightSystemConfig {
            atlas_size: 1000,
            atlas_tile_size: 64,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::AtlasNotDivisible {
                atlas_size: 1000,
                tile_size: 64
            })
        );
    }

    #[test]
    fn test_zero_tile_size_is_rejected() {
        let config = LightSystemConfig {
            atlas_tile_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTileSize));
    }

    #[test]
    fn test_zero_updates_is_legal() {
        let config = LightSystemConfig {
            max_shadow_updates: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = LightSystemConfig {
            max_lights: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity("max_lights")));
    }

    #[test]
    fn test_capacity_beyond_float_precision_is_rejected() {
        let config = LightSystemConfig {
            max_shadow_sources: MAX_GPU_INDEX_COUNT + 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooLarge {
                field: "max_shadow_sources",
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_tile_grid_is_rejected() {
        let config = LightSystemConfig {
            atlas_size: 65536,
            atlas_tile_size: 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::TooLarge { .. })));
    }

    #[test]
    fn test_ron_partial_config() {
        let config = LightSystemConfig::from_ron_str(
            "(max_lights: 16, shadow_update_distance: 42.5, commands_per_frame: 8)",
        )
        .unwrap();
        assert_eq!(config.max_lights, 16);
        assert_eq!(config.shadow_update_distance, 42.5);
        assert_eq!(config.commands_per_frame, 8);
        assert_eq!(config.max_shadow_sources, 2048);
    }

    #[test]
    fn test_ron_invalid_config_is_rejected() {
        let err = LightSystemConfig::from_ron_str("(atlas_size: 100)").unwrap_err();
        assert!(matches!(err, ConfigError::AtlasNotDivisible { .. }));
        let err = LightSystemConfig::from_ron_str("(atlas_size: \"big\")").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
