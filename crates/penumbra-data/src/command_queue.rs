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

//! A FIFO batch of fixed-size GPU state-change records.

use std::collections::VecDeque;

use penumbra_core::renderer::command::{GpuCommand, GPU_COMMAND_SIZE};

/// Buffers [`GpuCommand`]s and flushes a bounded number of them per frame.
///
/// Nothing is ever dropped: commands that do not fit in a flush stay queued
/// for the next one, in order.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    commands: VecDeque<GpuCommand>,
    commands_per_frame: usize,
    num_processed: usize,
}

impl CommandQueue {
    /// Creates an empty queue that flushes at most `commands_per_frame`
    /// commands per [`process`](Self::process) call.
    pub fn new(commands_per_frame: usize) -> Self {
        Self {
            commands: VecDeque::new(),
            commands_per_frame,
            num_processed: 0,
        }
    }

    /// Appends a command to the back of the queue.
    pub fn enqueue(&mut self, command: GpuCommand) {
        log::trace!("CommandQueue: enqueue {command}");
        self.commands.push_back(command);
    }

    /// Number of commands waiting.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Discards all waiting commands.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// The per-frame flush limit.
    pub fn commands_per_frame(&self) -> usize {
        self.commands_per_frame
    }

    /// Length in floats of a destination buffer large enough for one full flush.
    pub fn buffer_len(&self) -> usize {
        self.commands_per_frame * GPU_COMMAND_SIZE
    }

    /// Number of commands written by the last flush. Consumers read this as
    /// the valid prefix length of the destination buffer.
    pub fn num_processed_commands(&self) -> usize {
        self.num_processed
    }

    /// Iterates over the waiting commands, front first.
    pub fn iter(&self) -> impl Iterator<Item = &GpuCommand> {
        self.commands.iter()
    }

    /// Pops up to `limit` commands in FIFO order and writes each one at a
    /// fixed stride of [`GPU_COMMAND_SIZE`] floats into `dest`.
    ///
    /// The count is also capped by how many records fit in `dest`. Returns the
    /// number of commands written.
    pub fn flush(&mut self, limit: usize, dest: &mut [f32]) -> usize {
        let capacity = dest.len() / GPU_COMMAND_SIZE;
        let count = limit.min(capacity).min(self.commands.len());
        for (index, command) in self.commands.drain(..count).enumerate() {
            command.write_to(dest, index);
        }
        assert!(count <= limit, "flushed {count} commands over limit {limit}");

        self.num_processed = count;
        if count > 0 {
            log::debug!(
                "CommandQueue: flushed {count} commands, {} pending",
                self.commands.len()
            );
        }
        count
    }

    /// Flushes up to the configured per-frame limit into `dest`.
    pub fn process(&mut self, dest: &mut [f32]) -> usize {
        self.flush(self.commands_per_frame, dest)
    }
}
