//! Join performance benchmarks: hash-join build/probe at several build
//! sizes, and the optimizer's rewrite cost on a representative plan.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use rowmill::{Catalog, Executor, Optimizer, PlanBuilder, StatisticsConfig};

fn make_tables(dir: &TempDir, build_rows: u32, probe_rows: u32) -> (PathBuf, PathBuf) {
    let mut customers = String::from("id:integer,name:string,age:integer\n");
    for i in 0..build_rows {
        let _ = writeln!(customers, "{},customer{},{}", i, i, 20 + i % 50);
    }
    let customers_path = dir.path().join("customers.csv");
    fs::write(&customers_path, customers).expect("write customers");

    let mut orders = String::from("oid:integer,cid:integer\n");
    for i in 0..probe_rows {
        let _ = writeln!(orders, "{},{}", i, i % (build_rows * 2));
    }
    let orders_path = dir.path().join("orders.csv");
    fs::write(&orders_path, orders).expect("write orders");

    (customers_path, orders_path)
}

fn bench_hash_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_join");
    for build_rows in [100u32, 1_000, 10_000] {
        let dir = TempDir::new().expect("temp dir");
        let (customers, orders) = make_tables(&dir, build_rows, 10_000);
        let out = dir.path().join("out.csv");

        let plan = PlanBuilder::scan(&customers)
            .expect("scan")
            .join(PlanBuilder::scan(&orders).expect("scan"), "id = cid")
            .expect("join")
            .project(["name", "oid"])
            .expect("project")
            .sink(&out)
            .build();

        group.bench_with_input(BenchmarkId::from_parameter(build_rows), &plan, |b, plan| {
            b.iter(|| Executor::new().execute(plan).expect("execute"));
        });
    }
    group.finish();
}

fn bench_optimizer_rewrite(c: &mut Criterion) {
    let dir = TempDir::new().expect("temp dir");
    let (customers, orders) = make_tables(&dir, 1_000, 10_000);
    let out = dir.path().join("out.csv");

    let plan = PlanBuilder::scan(&orders)
        .expect("scan")
        .join(PlanBuilder::scan(&customers).expect("scan"), "cid = id")
        .expect("join")
        .filter("age > 30")
        .expect("filter")
        .filter("oid < 5000")
        .expect("filter")
        .project(["name", "oid"])
        .expect("project")
        .sink(&out)
        .build();

    let mut catalog = Catalog::new();
    catalog
        .analyze(&customers, &StatisticsConfig::default())
        .expect("analyze");
    catalog
        .analyze(&orders, &StatisticsConfig::default())
        .expect("analyze");

    let optimizer = Optimizer::new();
    c.bench_function("optimizer_rewrite", |b| {
        b.iter(|| optimizer.optimize(&plan, &catalog));
    });
}

criterion_group!(benches, bench_hash_join, bench_optimizer_rewrite);
criterion_main!(benches);
