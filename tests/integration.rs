//! End-to-end integration tests for the tei-triples pipeline.
//!
//! These tests run real fixture documents through the bundled transform
//! programs and the built-in extractors, checking the data graph, the
//! problems graph, and the failure paths together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use oxigraph::io::RdfFormat;
use oxigraph::model::{Literal, NamedNode, Term, Triple};

use tei_triples::config::{IssuePolicy, PipelineConfig};
use tei_triples::error::{ExtractionError, ExtractionResult};
use tei_triples::extract::{
    ExtractionAdapter, ExtractionContext, ExtractionEngine, Extractor, Issue, IssueCollector,
    Resource, TripleAccumulator, TripleHandler, Value,
};
use tei_triples::model::{DEFAULT_PROBLEM_PREDICATE, Graph};
use tei_triples::pipeline::Pipeline;
use tei_triples::resolve::PrefixResolver;
use tei_triples::source::FileSource;

const DCTERMS: &str = "http://purl.org/dc/terms/";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn read(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

fn iri(s: &str) -> NamedNode {
    NamedNode::new(s).unwrap()
}

fn test_pipeline() -> Pipeline {
    Pipeline::new(&PipelineConfig::load(&fixture("pipeline.toml")).unwrap()).unwrap()
}

fn problem_messages(graph: &Graph, subject: &NamedNode) -> Vec<String> {
    graph
        .objects_for(subject, &iri(DEFAULT_PROBLEM_PREDICATE))
        .into_iter()
        .filter_map(|term| match term {
            Term::Literal(l) => Some(l.value().to_string()),
            _ => None,
        })
        .collect()
}

#[test]
fn publisher_reference_becomes_a_resource() {
    let pipeline = test_pipeline();
    let subject = iri("http://fedora");
    let dataset = pipeline.convert(&read("tei.xml"), &subject).unwrap();

    let expected = Triple::new(
        subject.clone(),
        iri(&format!("{DCTERMS}publisher")),
        iri("http://www.ancientwisdoms.ac.uk"),
    );
    assert!(dataset.default_graph().contains(&expected));
}

#[test]
fn clean_document_has_data_and_no_problems() {
    let pipeline = test_pipeline();
    let subject = iri("http://localhost/rest/objects/saws-1");
    let conversion = pipeline.conversion(&read("tei.xml"), &subject).unwrap();
    assert!(conversion.is_complete(), "outcome: {}", conversion.outcome());

    let dataset = conversion.into_dataset();
    assert!(dataset.problems().is_none());

    let data = dataset.default_graph();
    let title = data.objects_for(&subject, &iri(&format!("{DCTERMS}title")));
    assert_eq!(
        title,
        vec![Term::from(Literal::new_simple_literal(
            "Sayings of the Philosophers"
        ))]
    );

    // Divisions are described by their (existing or generated) identifiers.
    let parts = data.objects_for(&subject, &iri(&format!("{DCTERMS}hasPart")));
    assert_eq!(parts.len(), 2);
    assert!(parts.contains(&Term::from(iri(
        "http://localhost/rest/objects/saws-1#ch2"
    ))));
    let chapter_two = iri("http://localhost/rest/objects/saws-1#ch2");
    assert_eq!(
        data.objects_for(&chapter_two, &iri(&format!("{DCTERMS}type"))),
        vec![Term::from(Literal::new_simple_literal("chapter"))]
    );
}

#[test]
fn conversion_is_repeatable() {
    let pipeline = test_pipeline();
    let subject = iri("http://fedora");
    let first = pipeline.convert(&read("tei.xml"), &subject).unwrap();
    let second = pipeline.convert(&read("tei.xml"), &subject).unwrap();
    assert_eq!(first, second);
}

#[test]
fn warning_fixture_reports_problems_alongside_data() {
    let pipeline = test_pipeline();
    let subject = iri("http://fedora");
    let dataset = pipeline.convert(&read("tei-warning.xml"), &subject).unwrap();

    let problems = dataset.problems().expect("problems graph");
    assert!(!problems.is_empty());
    let messages = problem_messages(problems, &subject);
    assert!(
        messages
            .iter()
            .all(|m| m.starts_with("Extraction issue: (")),
        "{messages:?}"
    );

    // The additive policy keeps the title.
    let title = dataset
        .default_graph()
        .objects_for(&subject, &iri(&format!("{DCTERMS}title")));
    assert_eq!(title.len(), 1);
}

#[test]
fn warning_problem_names_column_and_row_of_the_bad_reference() {
    let pipeline = test_pipeline();
    let subject = iri("http://fedora");
    let input = read("tei-warning.xml");

    let encoded = String::from_utf8(pipeline.chain().transform(&input).unwrap()).unwrap();
    let (row, line) = encoded
        .lines()
        .enumerate()
        .find(|(_, line)| line.contains(r#"rdf:resource="not a uri""#))
        .expect("publisher statement in the encoded document");
    let column = line[..line.find("rdf:resource").unwrap()].chars().count() + 1;

    let dataset = pipeline.convert(&input, &subject).unwrap();
    let messages = problem_messages(dataset.problems().unwrap(), &subject);
    assert_eq!(messages.len(), 1);
    let expected = format!("Extraction issue: ({column},{}): ", row + 1);
    assert!(messages[0].starts_with(&expected), "{}", messages[0]);
    assert!(messages[0].contains("not a uri"), "{}", messages[0]);
}

#[test]
fn broken_reference_adds_no_invented_statements() {
    let pipeline = test_pipeline();
    let dataset = pipeline
        .convert(&read("tei-warning.xml"), &iri("http://fedora"))
        .unwrap();
    let data = dataset.default_graph();
    assert!(!data.is_empty());

    let rdf_type = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    for triple in data.iter() {
        assert_ne!(triple.predicate.as_str(), rdf_type, "{triple}");
        assert!(!triple.subject.to_string().contains("genid-"), "{triple}");
    }
}

#[test]
fn replace_policy_discards_data_on_issues() {
    let config = PipelineConfig {
        issue_policy: IssuePolicy::Replace,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(&config).unwrap();
    let subject = iri("http://fedora");

    let dataset = pipeline.convert(&read("tei-warning.xml"), &subject).unwrap();
    assert!(dataset.default_graph().is_empty());
    assert!(dataset.problems().is_some());

    let clean = pipeline.convert(&read("tei.xml"), &subject).unwrap();
    assert!(!clean.default_graph().is_empty());
}

#[test]
fn malformed_tei_yields_only_problems() {
    let pipeline = test_pipeline();
    let subject = iri("http://fedora");
    let conversion = pipeline.conversion(&read("not-xml.xml"), &subject).unwrap();
    assert!(conversion.is_failed());

    let dataset = conversion.into_dataset();
    assert!(dataset.default_graph().is_empty());
    let messages = problem_messages(dataset.problems().unwrap(), &subject);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("stage 1"), "{}", messages[0]);
}

#[test]
fn rdf_xml_triples_follow_the_object_policy() {
    let pipeline = test_pipeline();
    let subject = iri("info:fedora/uva-lib:1038847");
    let conversion = pipeline.convert_rdf_xml(&read("rdf.xml"), &subject).unwrap();
    let data = conversion.data().unwrap();

    let rel = |local: &str| iri(&format!("http://fedora.lib.virginia.edu/relationships#{local}"));
    assert!(data.contains(&Triple::new(
        subject.clone(),
        rel("testPredicate"),
        iri("info:test/resource"),
    )));
    assert!(data.contains(&Triple::new(
        subject.clone(),
        rel("testPredicateWithLiteral"),
        Literal::new_simple_literal("literal value"),
    )));
    assert!(data.contains(&Triple::new(
        subject,
        rel("testPredicateWithLiteral"),
        Literal::new_simple_literal("/relative/uri/"),
    )));
}

#[test]
fn malformed_rdf_xml_yields_one_problem() {
    let pipeline = test_pipeline();
    let subject = iri("info:fedora/uva-lib:1038847");

    let adapter = ExtractionAdapter::rdf_xml();
    let err = adapter.extract(&read("bad-rdf.xml"), &subject).unwrap_err();
    assert!(matches!(err, ExtractionError::Malformed { .. }));

    let dataset = pipeline
        .convert_rdf_xml(&read("bad-rdf.xml"), &subject)
        .unwrap()
        .into_dataset();
    assert!(dataset.default_graph().is_empty());
    let messages = problem_messages(dataset.problems().unwrap(), &subject);
    assert_eq!(messages, vec![err.to_string()]);
}

/// Reports two issues at known locations and no statements.
struct Complaining;

impl Extractor for Complaining {
    fn name(&self) -> &str {
        "complaining"
    }

    fn accepts(&self, media_type: &str) -> bool {
        media_type == "application/rdf+xml"
    }

    fn extract(
        &self,
        _input: &[u8],
        context: &ExtractionContext,
        handler: &mut dyn TripleHandler,
        issues: &mut IssueCollector,
    ) -> ExtractionResult<()> {
        handler.receive_triple(
            Resource::Iri(context.document.as_str()),
            "http://purl.org/dc/terms/title",
            Value::Literal("Complaints"),
            None,
            context,
        )?;
        issues.report(Issue::error("unexpected element").at(7, 3));
        issues.report(Issue::warning("no location"));
        Ok(())
    }
}

#[test]
fn problems_carry_column_and_row() {
    let engine = ExtractionEngine::empty().with_extractor(Complaining);
    let pipeline = test_pipeline()
        .with_adapter(ExtractionAdapter::new(engine, "application/rdf+xml"));
    let subject = iri("http://fedora");

    let conversion = pipeline.conversion(&read("tei.xml"), &subject).unwrap();
    assert_eq!(conversion.outcome(), "degraded");

    let mut messages = problem_messages(conversion.problems().unwrap(), &subject);
    messages.sort();
    assert_eq!(
        messages,
        vec![
            "Extraction issue: (-1,-1): no location".to_string(),
            "Extraction issue: (3,7): unexpected element".to_string(),
        ]
    );
    assert_eq!(conversion.data().map(Graph::len), Some(1));
}

#[test]
fn content_length_announcement_escapes_convert() {
    let engine = ExtractionEngine::new().with_content_length_announcement(true);
    let pipeline = test_pipeline()
        .with_adapter(ExtractionAdapter::new(engine, "application/rdf+xml"));
    let err = pipeline
        .convert(&read("tei.xml"), &iri("http://fedora"))
        .unwrap_err();
    assert_eq!(err.operation, "set_content_length");
}

#[test]
fn reset_accumulator_matches_fresh_one() {
    let engine = ExtractionEngine::new();
    let input = read("rdf.xml");
    let base = "info:fedora/uva-lib:1038847";

    let mut fresh = TripleAccumulator::new();
    engine
        .extract(&input, "application/rdf+xml", base, &mut fresh)
        .unwrap();

    let mut reused = TripleAccumulator::new();
    engine
        .extract(&read("tei.xml"), "application/rdf+xml", base, &mut reused)
        .ok();
    reused.reset();
    engine
        .extract(&input, "application/rdf+xml", base, &mut reused)
        .unwrap();

    assert_eq!(fresh.graph(), reused.graph());
}

#[test]
fn concurrent_conversions_share_one_pipeline() {
    let pipeline = Arc::new(test_pipeline());
    let input = read("tei.xml");
    let expected = pipeline.convert(&input, &iri("http://fedora")).unwrap();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let dataset = pipeline.convert(&input, &iri("http://fedora")).unwrap();
                assert_eq!(dataset, expected);
            });
        }
    });

    // Pools never hold more than pool_size idle engines.
    for stage in [
        tei_triples::transform::Stage::Identify,
        tei_triples::transform::Stage::Encode,
    ] {
        assert!(pipeline.chain().pool(stage).stats().idle <= 2);
    }
}

#[test]
fn file_source_and_prefix_resolver() {
    let pipeline = test_pipeline();
    let resolver = PrefixResolver::new("http://localhost/rest/");

    let ok = pipeline
        .convert_source(&FileSource::new(fixture("tei.xml")), &resolver, "objects/saws-1")
        .unwrap();
    assert!(ok.is_complete());

    let missing = pipeline
        .convert_source(&FileSource::new(fixture("absent.xml")), &resolver, "objects/x")
        .unwrap();
    assert!(missing.is_failed());
    let subject = iri("http://localhost/rest/objects/x");
    assert_eq!(problem_messages(missing.problems().unwrap(), &subject).len(), 1);
}

#[test]
fn datasets_serialize_as_nquads_and_trig() {
    let pipeline = test_pipeline();
    let dataset = pipeline
        .convert(&read("tei-warning.xml"), &iri("http://fedora"))
        .unwrap();

    let nquads = dataset
        .serialize(RdfFormat::NQuads, pipeline.graph_base(), Vec::new())
        .unwrap();
    let nquads = String::from_utf8(nquads).unwrap();
    assert!(nquads.contains("<info:tei-triples/graph/problems>"));

    let trig = dataset
        .serialize(RdfFormat::TriG, pipeline.graph_base(), Vec::new())
        .unwrap();
    assert!(!trig.is_empty());
}
