//! Criterion benchmarks for the terrain bitmaps and the per-map movement
//! check at a few terrain densities.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use realm_core::constants::{MAP_HEIGHT, MAP_WIDTH};
use realm_core::types::Position;
use tilerealm_server::map_cache::{MapResourceSet, MapResources};
use tilerealm_server::map_manager::MapManager;
use tilerealm_server::spatial::{Coord, SpatialIndex, TileBitmap};

/// Share of tiles marked blocked, in percent.
fn densities() -> Vec<(&'static str, u32)> {
    vec![("sparse", 5), ("dense", 40)]
}

fn random_tiles(rng: &mut StdRng, percent: u32) -> Vec<Coord> {
    let mut tiles = Vec::new();
    for y in 1..=MAP_HEIGHT {
        for x in 1..=MAP_WIDTH {
            if rng.gen_range(0..100) < percent {
                tiles.push((x, y));
            }
        }
    }
    tiles
}

fn resources(maps: u16, percent: u32) -> MapResources {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut resources = MapResources::default();
    for map_id in 1..=maps {
        let mut set = MapResourceSet::default();
        set.blocked.extend(random_tiles(&mut rng, percent));
        set.water.extend(random_tiles(&mut rng, percent / 4));
        set.trees.extend(random_tiles(&mut rng, 2));
        set.blocked.extend(set.trees.iter().copied());
        resources.maps.insert(map_id, set);
    }
    resources
}

fn bench_bitmap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bitmap");
    for (label, percent) in densities() {
        let mut rng = StdRng::seed_from_u64(7);
        let tiles = random_tiles(&mut rng, percent);

        group.bench_with_input(BenchmarkId::new("build", label), &tiles, |b, tiles| {
            b.iter(|| TileBitmap::from_set(MAP_WIDTH, MAP_HEIGHT, tiles.iter().copied()));
        });

        let bitmap = TileBitmap::from_set(MAP_WIDTH, MAP_HEIGHT, tiles.iter().copied());
        group.bench_with_input(BenchmarkId::new("get_all", label), &bitmap, |b, bitmap| {
            b.iter(|| {
                let mut hits = 0usize;
                for y in 1..=MAP_HEIGHT {
                    for x in 1..=MAP_WIDTH {
                        hits += bitmap.get(black_box(x), black_box(y)) as usize;
                    }
                }
                hits
            });
        });
        group.bench_with_input(BenchmarkId::new("count", label), &bitmap, |b, bitmap| {
            b.iter(|| bitmap.count());
        });
    }
    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_index");
    for (label, percent) in densities() {
        let resources = resources(8, percent);
        group.bench_with_input(
            BenchmarkId::new("from_resources", label),
            &resources,
            |b, resources| b.iter(|| SpatialIndex::from_resources(resources)),
        );

        let index = SpatialIndex::from_resources(&resources);
        let mut rng = StdRng::seed_from_u64(11);
        let probes: Vec<(u16, u16, u16)> = (0..1024)
            .map(|_| {
                (
                    rng.gen_range(1..=9),
                    rng.gen_range(1..=MAP_WIDTH),
                    rng.gen_range(1..=MAP_HEIGHT),
                )
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("queries", label), &probes, |b, probes| {
            b.iter(|| {
                let mut open = 0usize;
                for &(map, x, y) in probes {
                    open += index.is_walkable(map, x, y) as usize;
                    open += index.has_resource(map, x, y).is_some() as usize;
                }
                open
            });
        });
    }
    group.finish();
}

fn bench_can_move_to(c: &mut Criterion) {
    let mut group = c.benchmark_group("can_move_to");
    for (label, percent) in densities() {
        let maps = MapManager::new(resources(1, percent), 10);
        let mut rng = StdRng::seed_from_u64(13);
        for user_id in 0..250 {
            let x = rng.gen_range(1..=MAP_WIDTH);
            let y = rng.gen_range(1..=MAP_HEIGHT);
            if let Some(position) = Position::new(x, y) {
                if maps.can_move_to(1, x, y) {
                    maps.update_player_tile(user_id, 1, None, position);
                }
            }
        }

        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| {
                let mut open = 0usize;
                for y in 1..=MAP_HEIGHT {
                    for x in 1..=MAP_WIDTH {
                        open += maps.can_move_to(1, black_box(x), black_box(y)) as usize;
                    }
                }
                open
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bitmap, bench_index, bench_can_move_to);
criterion_main!(benches);
