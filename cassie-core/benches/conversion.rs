use cassie_core::convert::{columns_from_wire, super_columns_from_wire};
use cassie_core::transport::{WireColumn, WireSuperColumn};
use cassie_core::Column;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn create_wire_columns(count: usize, value_len: usize) -> Vec<WireColumn> {
    (0..count)
        .map(|i| WireColumn {
            name: format!("column.{}", i).into_bytes(),
            value: vec![(i % 251) as u8; value_len],
            timestamp: 1634567890000000 + i as i64,
        })
        .collect()
}

fn bench_inbound(c: &mut Criterion) {
    let mut group = c.benchmark_group("columns_from_wire");

    for count in [1, 100, 1000] {
        let records = create_wire_columns(count, 64);
        group.bench_with_input(BenchmarkId::from_parameter(count), &records, |b, records| {
            b.iter(|| columns_from_wire(black_box(records)))
        });
    }

    group.finish();
}

fn bench_super_columns(c: &mut Criterion) {
    let records: Vec<WireSuperColumn> = (0..50)
        .map(|i| WireSuperColumn {
            name: format!("super.{}", i).into_bytes(),
            columns: create_wire_columns(20, 32),
        })
        .collect();

    c.bench_function("super_columns_from_wire_50x20", |b| {
        b.iter(|| super_columns_from_wire(black_box(&records)))
    });
}

fn bench_outbound(c: &mut Criterion) {
    let column = Column::new("age\r\n", vec![0u8; 4096], 0);

    c.bench_function("column_to_wire_4k", |b| {
        b.iter(|| black_box(&column).to_wire())
    });
}

criterion_group!(benches, bench_inbound, bench_super_columns, bench_outbound);
criterion_main!(benches);
