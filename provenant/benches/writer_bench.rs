//! Canonicalization and hashing throughput for the writer hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use provenant::batch::{Record, RecordBatch};
use provenant::config::{HashAlgorithm, WriterConfig};
use provenant::writer::{canonical_value, dataset_digest, row_digest};

fn build_batch(rows: usize) -> RecordBatch {
    let mut batch = RecordBatch::new(
        "proteins",
        "2.1.0",
        vec![
            "accession".to_string(),
            "gene".to_string(),
            "taxon".to_string(),
            "mass".to_string(),
        ],
    );
    for i in 0..rows {
        batch.push(
            Record::new()
                .with("accession", format!("P{i:05}"))
                .with("gene", format!("  gene {i}  symbol "))
                .with("taxon", 9606i64)
                .with("mass", 1.234_567_89 * i as f64),
        );
    }
    batch
}

fn bench_canonical_hashing(c: &mut Criterion) {
    let batch = build_batch(1_000);
    let config = WriterConfig {
        business_key: vec!["accession".to_string()],
        ..WriterConfig::default()
    };

    c.bench_function("canonicalize_and_hash_1k_rows", |b| {
        b.iter(|| {
            let row_hashes: Vec<String> = batch
                .rows
                .iter()
                .map(|row| {
                    let cells: Vec<String> = batch
                        .columns
                        .iter()
                        .map(|col| canonical_value(row.get_or_null(col), &config))
                        .collect();
                    let fields: Vec<&str> = cells.iter().map(String::as_str).collect();
                    row_digest(HashAlgorithm::Sha256, &fields)
                })
                .collect();
            black_box(dataset_digest(HashAlgorithm::Sha256, &row_hashes));
        });
    });
}

criterion_group!(benches, bench_canonical_hashing);
criterion_main!(benches);
