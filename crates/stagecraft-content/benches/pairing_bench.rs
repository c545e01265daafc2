//! Criterion benchmarks for index scans and underground pairing.

use criterion::{Criterion, criterion_group, criterion_main};
use stagecraft_content::test_utils::*;
use stagecraft_content::{ProjectContent, find_underground_pair};
use stagecraft_core::external::BeltIo;
use stagecraft_core::id::EntityId;
use stagecraft_core::pos::Direction;

/// A 64-belt east-west underground weave with machines in between.
fn weave() -> (ProjectContent, Vec<EntityId>) {
    let mut content = test_content();
    let mut inputs = Vec::new();
    for row in 0..8 {
        for col in 0..4 {
            let x = col * 8;
            inputs.push(content.add_entity(underground_entity(
                x,
                row,
                Direction::East,
                BeltIo::Input,
                1 + (col as u32 % 3),
            )));
            content.add_entity(underground_entity(
                x + 4,
                row,
                Direction::East,
                BeltIo::Output,
                1,
            ));
        }
        content.add_entity(machine_entity("assembling-machine-1", 40, row, 1));
    }
    (content, inputs)
}

fn bench_pairing(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairing");
    group.sample_size(50);

    group.bench_function("find_pair_64_belts", |b| {
        let (content, inputs) = weave();
        b.iter(|| {
            for &input in &inputs {
                let _ = find_underground_pair(&content, input, 2, None, None);
            }
        });
    });

    group.bench_function("find_compatible_320_lookups", |b| {
        let (content, _) = weave();
        b.iter(|| {
            for x in 0..40 {
                for y in 0..8 {
                    let _ = content.find_compatible_entity(
                        "underground-belt",
                        stagecraft_core::pos::Position::new(x, y),
                        None,
                        2,
                    );
                }
            }
        });
    });

    group.bench_function("add_100_entities", |b| {
        b.iter(|| {
            let mut content = test_content();
            for y in 0..10 {
                for x in 0..10 {
                    content.add_entity(machine_entity("assembling-machine-1", x * 2, y * 2, 1));
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pairing);
criterion_main!(benches);
