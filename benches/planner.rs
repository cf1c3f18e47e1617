//! Criterion benchmarks for parsing and planning.
//!
//! Everything runs on in-memory content; no files are read or written.

use camino::Utf8Path;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use vmxtune::services::{ChangePlanner, PolicyEngine};
use vmxtune::{Settings, VmxFile};

/// A configuration of roughly the size the engine writes for a desktop VM.
fn sample_config(guest_os: &str, adapters: u32) -> String {
    let mut content = String::from(".encoding = \"UTF-8\"\r\nconfig.version = \"8\"\r\n");
    content.push_str(&format!("guestOS = \"{}\"\r\n", guest_os));
    content.push_str("virtualHW.version = \"19\"\r\nmemsize = \"4096\"\r\nnumvcpus = \"2\"\r\n");
    for i in 0..40 {
        content.push_str(&format!("scsi0:{}.present = \"FALSE\"\r\n", i));
    }
    for i in 0..adapters {
        content.push_str(&format!("ethernet{}.present = \"TRUE\"\r\n", i));
        content.push_str(&format!("ethernet{}.connectionType = \"nat\"\r\n", i));
        content.push_str(&format!("ethernet{}.virtualDev = \"e1000\"\r\n", i));
    }
    content
}

fn bench_parse(c: &mut Criterion) {
    let content = sample_config("windows9-64", 2);
    c.bench_function("vmx_file/parse", |b| {
        b.iter(|| {
            let file = VmxFile::parse(Utf8Path::new("/vms/bench.vmx"), black_box(&content));
            black_box(file);
        })
    });
}

fn bench_plan(c: &mut Criterion) {
    let settings = Settings::default();
    let planner = ChangePlanner::new(PolicyEngine::new(settings.baseline_adapter), &settings);

    let mut group = c.benchmark_group("planner");
    for (guest, adapters) in [("windows9-64", 1), ("winxppro", 4), ("ubuntu-64", 10)] {
        let file = VmxFile::parse(Utf8Path::new("/vms/bench.vmx"), &sample_config(guest, adapters));
        group.bench_with_input(
            BenchmarkId::new("plan", format!("{}x{}", guest, adapters)),
            &file,
            |b, file| {
                b.iter(|| {
                    let plan = planner.plan(black_box(file));
                    black_box(plan);
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_plan);
criterion_main!(benches);
