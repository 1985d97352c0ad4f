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

//! Defines the fixed-size GPU command record.
//!
//! Every state change the light system wants mirrored on the GPU is expressed
//! as a [`GpuCommand`]: 32 floats, the first of which is the [`CommandType`].
//! The remaining fields are op-specific operands. Integers are stored as
//! floats, which is exact for every slot index the system can hand out.
//!
//! # Layout
//!
//! | op               | operands                                                        |
//! |------------------|-----------------------------------------------------------------|
//! | `StoreLight`     | slot, type, ies profile, first source slot, position, color, per-kind data |
//! | `RemoveLight`    | slot                                                            |
//! | `StoreSource`    | slot, view-projection (16, column-major), uv rect (4)           |
//! | `RemoveSources`  | first slot, count                                               |

use crate::error::CommandError;
use crate::math::{Mat4, Vec3, Vec4};
use std::fmt;

/// Number of floats in one serialized command.
pub const GPU_COMMAND_SIZE: usize = 32;

/// The operation a [`GpuCommand`] performs on the GPU-resident light buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandType {
    /// Placeholder, never executed.
    Invalid = 0,
    /// Writes a light's data at its slot.
    StoreLight = 1,
    /// Clears a light slot.
    RemoveLight = 2,
    /// Writes a shadow source's matrix and atlas rect at its slot.
    StoreSource = 3,
    /// Clears a contiguous range of shadow source slots.
    RemoveSources = 4,
}

impl CommandType {
    /// All command types, in op-code order.
    pub const ALL: [CommandType; 5] = [
        CommandType::Invalid,
        CommandType::StoreLight,
        CommandType::RemoveLight,
        CommandType::StoreSource,
        CommandType::RemoveSources,
    ];

    /// The name used for this op when exported as a shader define.
    pub const fn define_name(&self) -> &'static str {
        match self {
            CommandType::Invalid => "CMD_invalid",
            CommandType::StoreLight => "CMD_store_light",
            CommandType::RemoveLight => "CMD_remove_light",
            CommandType::StoreSource => "CMD_store_source",
            CommandType::RemoveSources => "CMD_remove_sources",
        }
    }
}

/// Returns `(define name, op code)` pairs for every command type.
///
/// Shader preprocessors use these so the consuming pass decodes the same
/// op codes this crate writes.
pub fn command_defines() -> Vec<(&'static str, u32)> {
    CommandType::ALL
        .iter()
        .map(|ty| (ty.define_name(), *ty as u32))
        .collect()
}

/// A single serialized state change destined for the GPU.
#[derive(Clone, PartialEq)]
pub struct GpuCommand {
    command_type: CommandType,
    data: [f32; GPU_COMMAND_SIZE],
    cursor: usize,
}

impl GpuCommand {
    /// Creates a command of the given type. Field 0 holds the op code.
    pub fn new(command_type: CommandType) -> Self {
        let mut data = [0.0; GPU_COMMAND_SIZE];
        data[0] = command_type as u32 as f32;
        Self {
            command_type,
            data,
            cursor: 1,
        }
    }

    /// The operation this command encodes.
    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// Number of fields written so far, including the op code.
    pub fn len(&self) -> usize {
        self.cursor
    }

    /// Returns `true` if only the op code has been written.
    pub fn is_empty(&self) -> bool {
        self.cursor <= 1
    }

    /// The raw payload.
    pub fn data(&self) -> &[f32; GPU_COMMAND_SIZE] {
        &self.data
    }

    fn reserve(&mut self, count: usize) -> Result<usize, CommandError> {
        if self.cursor + count > GPU_COMMAND_SIZE {
            return Err(CommandError::PayloadOverflow {
                command_type: self.command_type,
                requested: count,
                remaining: GPU_COMMAND_SIZE - self.cursor,
            });
        }
        let start = self.cursor;
        self.cursor += count;
        Ok(start)
    }

    /// Appends one float.
    pub fn push_float(&mut self, value: f32) -> Result<(), CommandError> {
        let at = self.reserve(1)?;
        self.data[at] = value;
        Ok(())
    }

    /// Appends an integer, stored as a float.
    pub fn push_int(&mut self, value: i32) -> Result<(), CommandError> {
        self.push_float(value as f32)
    }

    /// Appends three floats.
    pub fn push_vec3(&mut self, value: Vec3) -> Result<(), CommandError> {
        let at = self.reserve(3)?;
        self.data[at..at + 3].copy_from_slice(&[value.x, value.y, value.z]);
        Ok(())
    }

    /// Appends four floats.
    pub fn push_vec4(&mut self, value: Vec4) -> Result<(), CommandError> {
        let at = self.reserve(4)?;
        self.data[at..at + 4].copy_from_slice(&value.to_array());
        Ok(())
    }

    /// Appends sixteen floats in column-major order.
    pub fn push_mat4(&mut self, value: &Mat4) -> Result<(), CommandError> {
        let at = self.reserve(16)?;
        self.data[at..at + 16].copy_from_slice(&value.to_cols_array());
        Ok(())
    }

    /// Copies the payload into `dest` at `index * GPU_COMMAND_SIZE`.
    ///
    /// # Panics
    ///
    /// Panics if `dest` is too short to hold the record at that index.
    pub fn write_to(&self, dest: &mut [f32], index: usize) {
        let offset = index * GPU_COMMAND_SIZE;
        dest[offset..offset + GPU_COMMAND_SIZE].copy_from_slice(&self.data);
    }
}

impl fmt::Debug for GpuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuCommand")
            .field("command_type", &self.command_type)
            .field("data", &&self.data[..self.cursor])
            .finish()
    }
}

impl fmt::Display for GpuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuCommand({:?}, size={}) [", self.command_type, self.cursor)?;
        for (i, value) in self.data[..self.cursor].iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}
