use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mtzjson::model::{MissingValue, Mtz};
use mtzjson::{from_tree, mtz, to_tree};

const NREF: usize = 50_000;

fn synthetic_record() -> Mtz {
    let mut record = Mtz::allocate(&[2], MissingValue::NaN);
    record.title = "bench".into();
    record.nref = NREF;
    let mut source = 0;
    for (d, dataset) in record.crystals[0].datasets.iter_mut().enumerate() {
        dataset.id = d as i32 + 1;
        dataset.name = format!("set{d}");
        dataset.allocate_columns(4, NREF, MissingValue::NaN);
        for column in &mut dataset.columns {
            source += 1;
            column.source = source;
            column.label = format!("C{source}");
            column.data = (0..NREF)
                .map(|i| if i % 17 == 0 { f32::NAN } else { i as f32 * 0.25 })
                .collect();
        }
    }
    record
}

fn bench_tree_mapping(c: &mut Criterion) {
    let record = synthetic_record();
    let tree = to_tree(&record);

    c.bench_function("to_tree_400k_values", |b| b.iter(|| to_tree(black_box(&record))));
    c.bench_function("from_tree_400k_values", |b| {
        b.iter(|| from_tree(black_box(&tree), MissingValue::NaN).unwrap())
    });
}

fn bench_mtz_codec(c: &mut Criterion) {
    let record = synthetic_record();
    let mut bytes = Vec::new();
    mtz::write(&record, &mut bytes).unwrap();

    c.bench_function("mtz_write_400k_values", |b| {
        b.iter(|| {
            let mut buf = Vec::with_capacity(bytes.len());
            mtz::write(black_box(&record), &mut buf).unwrap();
        })
    });
    c.bench_function("mtz_read_400k_values", |b| b.iter(|| mtz::read(black_box(&bytes[..])).unwrap()));
}

criterion_group!(benches, bench_tree_mapping, bench_mtz_codec);
criterion_main!(benches);
