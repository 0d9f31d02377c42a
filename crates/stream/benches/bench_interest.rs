use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use strata_common::{RegionPos, Requirement, SpatialIndex};
use strata_stream::{InterestConfig, InterestManager, Subscriber, ViewFormula};
use strata_world::{FlatGenerator, MemoryStore, NullLighting, ProviderConfig, RegionProvider};

fn manager(horizontal: i32, vertical: i32) -> InterestManager {
    let provider = RegionProvider::new(
        ProviderConfig::default(),
        Box::new(FlatGenerator::new(0)),
        Box::new(NullLighting),
        Arc::new(MemoryStore::new()),
    );
    let config = InterestConfig {
        horizontal_radius: horizontal,
        vertical_radius: vertical,
        ..InterestConfig::default()
    };
    InterestManager::new(config, provider).expect("valid bench config")
}

fn bench_index(count: i32, iterations: usize) {
    let start = Instant::now();
    for _ in 0..iterations {
        let mut index = SpatialIndex::new(0.75, 4);
        for i in 0..count {
            index.put(RegionPos::new(i % 64, i / 4096, (i / 64) % 64), i);
        }
        for i in 0..count {
            black_box(index.get(&RegionPos::new(i % 64, i / 4096, (i / 64) % 64)));
        }
        for i in (0..count).step_by(2) {
            index.remove(&RegionPos::new(i % 64, i / 4096, (i / 64) % 64));
        }
        black_box(index.len());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  index put/get/remove ({count} keys, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}"
    );
}

fn bench_view_positions(radius: i32, iterations: usize) {
    let view = ViewFormula::new(Vec3::ZERO, radius, radius / 2);
    let start = Instant::now();
    for _ in 0..iterations {
        black_box(view.positions().filter(|p| black_box(view.contains(*p))).count());
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations as u32;
    println!(
        "  view positions (r={radius}, {} regions, {iterations} iters): {per_iter:?}/iter, total {elapsed:?}",
        view.region_count()
    );
}

fn bench_join(subscribers: usize, radius: i32) {
    let mut m = manager(radius, radius / 2);
    let start = Instant::now();
    for i in 0..subscribers {
        let position = Vec3::new(i as f32 * 64.0, 0.0, 0.0);
        m.add_subscriber(Subscriber::new(position).with_requirement(Requirement::Load));
    }
    let elapsed = start.elapsed();
    println!(
        "  join ({subscribers} subscribers, r={radius}): {elapsed:?} total, {} region trackers",
        m.region_tracker_count()
    );
}

fn bench_walk(steps: usize, radius: i32) {
    let mut m = manager(radius, radius / 2);
    let s = Subscriber::new(Vec3::ZERO).with_requirement(Requirement::Generate);
    m.add_subscriber(s);

    let start = Instant::now();
    let mut generated = 0;
    for step in 0..steps {
        m.on_subscriber_moved(s.id, Vec3::new(step as f32 * 4.0, 0.0, 0.0));
        let stats = m.update_waiting(Duration::from_millis(1));
        generated += stats.generated;
        black_box(m.drain_messages());
    }
    let elapsed = start.elapsed();
    let per_tick = elapsed / steps as u32;
    println!(
        "  walk ({steps} ticks, r={radius}): {per_tick:?}/tick, {generated} generated, avg tick {:?}",
        m.timer().average()
    );
}

fn main() {
    println!("=== Interest Benchmarks ===");
    println!();

    println!("Spatial index:");
    bench_index(1_000, 100);
    bench_index(10_000, 10);
    println!();

    println!("View formula:");
    bench_view_positions(4, 1000);
    bench_view_positions(8, 1000);
    println!();

    println!("Subscriber join:");
    bench_join(1, 8);
    bench_join(8, 8);
    println!();

    println!("Subscriber walk:");
    bench_walk(100, 2);
    bench_walk(100, 4);
}
