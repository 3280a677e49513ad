//! Benchmarks for the merge loop over synthetic in-memory VCFs.
//!
//! Run with: `cargo bench --bench merge`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::io::Cursor;

use admatrix::source::VcfRecordReader;
use admatrix::{CellRepresentation, ExtractionRule, MergeEngine, RecordSource, TsvMatrixSink};

const SITES_PER_SAMPLE: u64 = 20_000;

/// One sample's VCF on two chromosomes; odd and even samples sit on alternating sites
fn synthetic_vcf(sample: usize) -> Vec<u8> {
    let mut text = String::from("##fileformat=VCFv4.2\n");
    text.push_str(&format!(
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS{sample}\n"
    ));
    for chromosome in ["chr2", "chr10"] {
        for i in 0..SITES_PER_SAMPLE / 2 {
            let position = 1 + i * 2 + sample as u64 % 2;
            let (reference, alternate) = (i % 40, (i * 7 + sample as u64) % 30);
            text.push_str(&format!(
                "{chromosome}\t{position}\t.\tA\tG\t50\tPASS\t.\tGT:AD:DP\t0/1:{reference},{alternate}:{}\n",
                reference + alternate
            ));
        }
    }
    text.into_bytes()
}

fn sources(inputs: &[Vec<u8>]) -> Vec<RecordSource<VcfRecordReader<Cursor<Vec<u8>>>>> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            RecordSource::open(format!("s{i}"), VcfRecordReader::new(Cursor::new(bytes.clone())))
                .expect("synthetic VCF opens")
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.sample_size(10);

    for samples in [2usize, 16, 64] {
        let inputs: Vec<Vec<u8>> = (0..samples).map(synthetic_vcf).collect();
        group.throughput(Throughput::Elements(samples as u64 * SITES_PER_SAMPLE));

        group.bench_with_input(BenchmarkId::new("rows_only", samples), &inputs, |b, inputs| {
            b.iter(|| {
                let mut engine = MergeEngine::new(
                    sources(inputs),
                    vec![ExtractionRule::new(CellRepresentation::Combined)],
                );
                black_box(engine.drain().expect("merge succeeds"))
            });
        });

        group.bench_with_input(BenchmarkId::new("two_matrices", samples), &inputs, |b, inputs| {
            b.iter(|| {
                let mut engine = MergeEngine::new(
                    sources(inputs),
                    vec![
                        ExtractionRule::new(CellRepresentation::Reference),
                        ExtractionRule::new(CellRepresentation::Alternate),
                    ],
                );
                let mut sinks = vec![
                    TsvMatrixSink::new("ref", 0, Vec::new()),
                    TsvMatrixSink::new("alt", 1, Vec::new()),
                ];
                black_box(engine.write_to(&mut sinks).expect("merge succeeds"));
                black_box(sinks)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
