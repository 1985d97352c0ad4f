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

//! Defines the error taxonomy of the light system.
//!
//! Capacity exhaustion in the shadow atlas is deliberately absent: running out
//! of atlas space is a soft miss reported through `Option`, not an error.

use crate::renderer::command::CommandType;
use thiserror::Error;

/// A configuration that cannot be used to build the light system.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// The atlas tile size is zero.
    #[error("Shadow atlas tile size must be greater than zero")]
    ZeroTileSize,
    /// The atlas size is not an exact multiple of the tile size.
    #[error("Shadow atlas size {atlas_size} is not divisible by tile size {tile_size}")]
    AtlasNotDivisible {
        /// Requested atlas size in texels.
        atlas_size: u32,
        /// Requested tile size in texels.
        tile_size: u32,
    },
    /// A table capacity was configured as zero.
    #[error("Capacity '{0}' must be greater than zero")]
    ZeroCapacity(&'static str),
    /// A size exceeds what the GPU command encoding can represent.
    #[error("'{field}' is {value}, the limit is {max}")]
    TooLarge {
        /// Name of the offending field.
        field: &'static str,
        /// Requested value.
        value: usize,
        /// Largest accepted value.
        max: usize,
    },
    /// The number of provided shadow render targets differs from the update budget.
    #[error("Expected {expected} shadow render targets, got {actual}")]
    RenderTargetCount {
        /// The configured maximum number of simultaneous shadow updates.
        expected: usize,
        /// The number of render targets supplied.
        actual: usize,
    },
    /// The configuration text could not be parsed.
    #[error("Failed to parse light system configuration: {0}")]
    Parse(String),
}

/// Misuse of a fixed-capacity slot table.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    /// The slot index is beyond the table capacity.
    #[error("Slot {slot} is out of range (capacity {capacity})")]
    OutOfRange {
        /// The offending slot.
        slot: usize,
        /// The table capacity.
        capacity: usize,
    },
    /// The slot already owns a resource.
    #[error("Slot {0} is already occupied")]
    Occupied(usize),
    /// The slot does not own a resource.
    #[error("Slot {0} is not occupied")]
    Vacant(usize),
}

/// Misuse of the shadow atlas.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AtlasError {
    /// A shadow map resolution is not a multiple of the atlas tile size.
    #[error("Shadow map resolution {resolution} is not a multiple of tile size {tile_size}")]
    InvalidResolution {
        /// The requested resolution in texels.
        resolution: u32,
        /// The atlas tile size in texels.
        tile_size: u32,
    },
    /// A region extends beyond the tile grid.
    #[error("Region ({x}, {y}, {w}, {h}) lies outside the {tiles}x{tiles} tile grid")]
    OutOfBounds {
        /// Left tile of the region.
        x: u32,
        /// Top tile of the region.
        y: u32,
        /// Width in tiles.
        w: u32,
        /// Height in tiles.
        h: u32,
        /// Tiles per atlas side.
        tiles: u32,
    },
}

/// Misuse of a [`GpuCommand`](crate::renderer::command::GpuCommand).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// A push would write past the fixed record size.
    #[error("{command_type:?} command overflow: {requested} fields requested, {remaining} remaining")]
    PayloadOverflow {
        /// The command being written.
        command_type: CommandType,
        /// Number of fields the push needed.
        requested: usize,
        /// Number of fields still free.
        remaining: usize,
    },
}

/// An error raised while attaching, detaching or editing a light.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LightError {
    /// Every light slot is taken.
    #[error("No free slot for a new light")]
    NoFreeSlot,
    /// The light already owns a slot and cannot be added again.
    #[error("Light is already attached to slot {0}")]
    AlreadyAttached(usize),
    /// The light (or handle) does not refer to an attached light.
    #[error("Light is not attached")]
    NotAttached,
    /// The attribute cannot change while the light is attached.
    #[error("Cannot change '{0}' while the light is attached")]
    LockedWhileAttached(&'static str),
    /// Serializing the light into a command failed.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// A slot table rejected the operation.
    #[error(transparent)]
    Slot(#[from] SlotError),
}
