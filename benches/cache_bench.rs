// Benchmarks for the file cache and directory sorting

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use npfm::model::sort::sort_records;
use npfm::{CacheConfig, FileCache, Location, SortKey};
use tokio::runtime::Runtime;

fn populated_directory(rt: &Runtime, count: usize) -> (tempfile::TempDir, FileCache, Location) {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("listing");
    std::fs::create_dir(&dir).unwrap();
    for i in 0..count {
        std::fs::write(dir.join(format!("file{}.txt", i)), vec![b'a'; i % 512]).unwrap();
    }

    let cache = FileCache::new(CacheConfig::with_root(root.path()).worker(false));
    let location = Location::for_path(&dir);
    rt.block_on(async {
        cache.directory(&location).load(None).await.unwrap();
    });
    (root, cache, location)
}

fn bench_cache_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (_root, cache, location) = populated_directory(&rt, 1000);
    let children: Vec<Location> = (0..1000).map(|i| location.child(&format!("file{}.txt", i))).collect();
    let directory = cache.directory(&location);
    let _held = directory.active_files();

    c.bench_function("cache_lookup_1000", |b| {
        b.iter(|| {
            for child in &children {
                black_box(cache.get(child));
            }
        })
    });
}

fn bench_sort(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("sort_records");

    for count in [100, 1000, 5000].iter() {
        let (_root, cache, location) = populated_directory(&rt, *count);
        let records = cache.directory(&location).active_files();

        for key in [SortKey::DisplayName, SortKey::Size, SortKey::Mtime] {
            group.bench_with_input(BenchmarkId::new(format!("{:?}", key), count), count, |b, _| {
                b.iter(|| {
                    let mut sorted = records.clone();
                    sort_records(&mut sorted, key, true, false);
                    black_box(sorted);
                })
            });
        }
    }

    group.finish();
}

fn bench_directory_load(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (_root, cache, location) = populated_directory(&rt, 1000);

    c.bench_function("directory_reload_1000", |b| {
        b.to_async(&rt).iter(|| async {
            cache.directory(&location).load(None).await.unwrap();
        })
    });
}

criterion_group!(benches, bench_cache_lookup, bench_sort, bench_directory_load);
criterion_main!(benches);
