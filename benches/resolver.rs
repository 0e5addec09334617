extern crate vfscope;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::{fmt::Write as _, hint::black_box, io::Read, sync::Arc};
use vfscope::prelude::*;

/// Builds a `newc` archive with `count` small members named `dir/NNNN.txt`.
fn archive(count: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut push = |name: &str, mode: u32, data: &[u8]| {
        let mut header = String::from("070701");
        for field in [1, mode, 0, 0, 1, 0, data.len() as u32, 0, 0, 0, 0, name.len() as u32 + 1, 0] {
            write!(header, "{field:08X}").unwrap();
        }
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.resize(out.len().next_multiple_of(4), 0);
        out.extend_from_slice(data);
        out.resize(out.len().next_multiple_of(4), 0);
    };

    for index in 0..count {
        push(&format!("dir/{index:04}.txt"), 0o100644, &[b'x'; 256]);
    }
    push("TRAILER!!!", 0, &[]);
    out
}

/// Compares resolving an archive member against a warm context with resolving it from scratch.
fn bench_resolve_member(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("bench.cpio");
    std::fs::write(&path, archive(2048)).expect("Failed to write archive");

    let resolver = Resolver::with_default_helpers(ResolverConfig::posix()).unwrap();
    let image = PathSpec::os(path.to_string_lossy().into_owned());
    let member = PathSpec::cpio("/dir/1024.txt", image.clone());

    let mut group = c.benchmark_group("resolve_member");
    group.throughput(Throughput::Elements(1));

    group.bench_function("cold_context", |b| {
        b.iter(|| {
            let context = Arc::new(ResolverContext::new());
            let file = resolver.open_file_object(black_box(&member), &context).unwrap();
            black_box(file.size().unwrap())
        });
    });

    // Holding the archive open keeps the parsed index cached between iterations.
    let context = Arc::new(ResolverContext::new());
    let _warm = resolver
        .open_file_system(&PathSpec::cpio("/", image), &context)
        .unwrap();
    group.bench_function("warm_context", |b| {
        b.iter(|| {
            let file = resolver.open_file_object(black_box(&member), &context).unwrap();
            black_box(file.size().unwrap())
        });
    });
    group.finish();
}

/// Sequential read throughput through the archive layer.
fn bench_read_member(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("bench.cpio");
    std::fs::write(&path, archive(16)).expect("Failed to write archive");

    let resolver = Resolver::with_default_helpers(ResolverConfig::posix()).unwrap();
    let member = PathSpec::cpio("/dir/0007.txt", PathSpec::os(path.to_string_lossy().into_owned()));
    let context = Arc::new(ResolverContext::new());

    let mut group = c.benchmark_group("read_member");
    group.throughput(Throughput::Bytes(256));
    group.bench_function("read_to_end", |b| {
        b.iter(|| {
            let mut file = resolver.open_file_object(&member, &context).unwrap();
            let mut data = Vec::with_capacity(256);
            file.read_to_end(&mut data).unwrap();
            black_box(data)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_resolve_member, bench_read_member);
criterion_main!(benches);
