//! Benchmarks for document conversion.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use oxigraph::model::NamedNode;

use tei_triples::extract::ExtractionAdapter;
use tei_triples::pipeline::Pipeline;
use tei_triples::transform::TransformChain;

const TEI: &str = include_str!("../tests/fixtures/tei.xml");

fn bench_transform_chain(c: &mut Criterion) {
    let chain = TransformChain::bundled(1).unwrap();

    c.bench_function("transform_chain", |bench| {
        bench.iter(|| black_box(chain.transform(TEI.as_bytes()).unwrap()))
    });
}

fn bench_extract(c: &mut Criterion) {
    let chain = TransformChain::bundled(1).unwrap();
    let rdf_xml = chain.transform(TEI.as_bytes()).unwrap();
    let adapter = ExtractionAdapter::rdf_xml();
    let subject = NamedNode::new("http://fedora").unwrap();

    c.bench_function("extract_rdf_xml", |bench| {
        bench.iter(|| black_box(adapter.extract(&rdf_xml, &subject).unwrap()))
    });
}

fn bench_convert(c: &mut Criterion) {
    let pipeline = Pipeline::with_defaults().unwrap();
    let subject = NamedNode::new("http://fedora").unwrap();

    c.bench_function("convert_end_to_end", |bench| {
        bench.iter(|| black_box(pipeline.convert(TEI.as_bytes(), &subject).unwrap()))
    });
}

criterion_group!(benches, bench_transform_chain, bench_extract, bench_convert);
criterion_main!(benches);
