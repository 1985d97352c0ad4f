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

use criterion::{criterion_group, criterion_main, Criterion};
use penumbra_data::{ShadowAtlas, SlotAllocator};
use std::hint::black_box;

fn bench_slot_iteration(c: &mut Criterion) {
    let mut table = SlotAllocator::new(65535);
    // Sparse table: every 7th slot used, highest slot near the middle.
    for slot in (0..32_000).step_by(7) {
        table.reserve_slot(slot, slot as u32).unwrap();
    }

    let mut group = c.benchmark_group("Slot Tables");

    group.bench_function("Sparse iteration (65535 capacity)", |b| {
        b.iter(|| {
            let mut sum = 0u64;
            for (_, value) in table.iter() {
                sum += *value as u64;
            }
            black_box(sum);
        });
    });

    group.bench_function("Consecutive run search (6 slots)", |b| {
        b.iter(|| black_box(table.find_consecutive_slots(6)));
    });

    group.finish();
}

fn bench_atlas(c: &mut Criterion) {
    let mut group = c.benchmark_group("Shadow Atlas");

    group.bench_function("Fill and release 4096 atlas (mixed sizes)", |b| {
        b.iter(|| {
            let mut atlas = ShadowAtlas::new(4096, 32).unwrap();
            let mut held = Vec::new();
            for size in [16, 8, 4, 4, 2, 2, 2, 1].iter().cycle().take(256) {
                if let Some(region) = atlas.find_and_reserve_region(*size, *size) {
                    held.push(region);
                }
            }
            for region in held.drain(..) {
                atlas.free_region(region).unwrap();
            }
            black_box(atlas.num_used_tiles());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_slot_iteration, bench_atlas);
criterion_main!(benches);
