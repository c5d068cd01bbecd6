use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use chrono::NaiveDateTime;
use geobench::core::types::GeoPoint;
use geobench::geo::{contains_point, haversine_km, synthesize_square};
use geobench::store::{GeoSession, GeoStore, MemoryStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TABLE: &str = "GEOPOINTS";

/// Random points around Beijing, where the taxi trajectories live
fn random_points(n: usize, seed: u64) -> Vec<GeoPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            GeoPoint::new(
                format!("{}-{}", i % 97, i),
                rng.gen_range(39.6..40.2),
                rng.gen_range(116.0..116.8),
                NaiveDateTime::default(),
            )
        })
        .collect()
}

fn loaded_session(n: usize) -> Box<dyn GeoSession> {
    let store = MemoryStore::new();
    let mut session = store.open_session().unwrap();
    session.reset(TABLE).unwrap();
    for p in random_points(n, 1) {
        session.insert(TABLE, &p.id, &p).unwrap();
    }
    session
}

fn bench_haversine(c: &mut Criterion) {
    c.bench_function("haversine_km", |b| {
        b.iter(|| haversine_km(black_box(39.9), black_box(116.4), black_box(40.1), black_box(116.6)))
    });
}

fn bench_point_in_polygon(c: &mut Criterion) {
    let square = synthesize_square(&GeoPoint::vertex(39.9, 116.4), 10.0);
    let points = random_points(1000, 2);
    c.bench_function("contains_point_1000", |b| {
        b.iter(|| {
            points
                .iter()
                .filter(|p| contains_point(black_box(&square), p.latitude, p.longitude))
                .count()
        })
    });
}

fn bench_memory_scans(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_scans");

    for size in [1_000usize, 10_000, 100_000].iter() {
        let mut session = loaded_session(*size);

        group.bench_with_input(BenchmarkId::new("knn_10", size), size, |b, _| {
            b.iter(|| session.scan_knn(TABLE, black_box(39.9), black_box(116.4), 10).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("distance_5km", size), size, |b, _| {
            b.iter(|| session.scan_by_distance(TABLE, black_box(39.9), black_box(116.4), 5.0).unwrap())
        });
        let square = synthesize_square(&GeoPoint::vertex(39.9, 116.4), 5.0);
        group.bench_with_input(BenchmarkId::new("polygon_5km", size), size, |b, _| {
            b.iter(|| session.scan_by_polygon(TABLE, black_box(&square)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_haversine, bench_point_in_polygon, bench_memory_scans);
criterion_main!(benches);
