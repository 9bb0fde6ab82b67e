//! Collision system benchmarks.
//!
//! Compares the grid-partitioned path (every entity registered in a cell)
//! against the unindexed fallback (no entity registered) at several entity
//! counts spread over a 64x64 grid.
//!
//! Run with: `cargo bench --bench collision_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tessera_core::prelude::*;

const GRID: u32 = 64;
const CELL: f64 = 32.0;

fn populate(count: usize, indexed: bool) -> (Grid, EntityRegistry) {
    let mut grid = Grid::new(GRID, GRID, CELL);
    let mut registry = EntityRegistry::new();
    for i in 0..count {
        // Deterministic scatter; every fourth entity is a projectile.
        let x = ((i * 7919) % (GRID as usize * CELL as usize)) as f64;
        let y = ((i * 104_729) % (GRID as usize * CELL as usize)) as f64;
        let projectile = i % 4 == 0;
        let (tag, wants): (&str, &[&str]) = if projectile {
            ("player_projectile", &[])
        } else {
            ("enemy", &["player_projectile"])
        };
        let mut entity = Entity::new(format!("e{i}"), "bench").with_tag(tag);
        entity.add(Transform::new(x, y));
        entity.add(
            Collision::new(CollisionBox::centered(24.0, 24.0), wants.iter().copied())
                .on_hit(|_owner, _other, _ctx| {}),
        );
        let id = registry.add(entity);
        if indexed {
            let cell = grid.world_to_cell(x, y);
            if let Some(entity) = registry.get_mut(id) {
                entity.add(GridPosition::at(cell, 0));
                grid.add_occupant(cell.col, cell.row, entity);
            }
        }
    }
    (grid, registry)
}

fn bench_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision_update");
    for &count in &[100usize, 500, 1_000] {
        for indexed in [true, false] {
            let label = if indexed { "indexed" } else { "unindexed" };
            let (mut grid, mut registry) = populate(count, indexed);
            let events = EventBus::new();
            let commands = CommandBuffer::new();
            let mut system = CollisionSystem::new();
            group.bench_with_input(BenchmarkId::new(label, count), &count, |b, _| {
                b.iter(|| {
                    let mut ctx = TickContext::new(1.0 / 60.0, &mut grid, &events, &commands);
                    black_box(system.update(&mut registry, &mut ctx))
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_collision);
criterion_main!(benches);
