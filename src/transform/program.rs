//! Transform programs: TOML definitions compiled once, shared by every engine.
//!
//! Two program kinds exist. An `annotate-ids` program gives every element a
//! stable identifier attribute. An `rdf-xml` program renders statements about
//! the document (and its identified elements) as RDF/XML. Two programs are
//! bundled into the binary; either can be replaced by a file on disk.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use oxigraph::model::NamedNode;
use regex::Regex;
use serde::Deserialize;

use crate::error::{ProgramError, ProgramResult};

/// RDF syntax namespace; always bound to the `rdf` prefix.
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

static RE_NCNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9._-]*$").unwrap());

static RE_QNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z_][A-Za-z0-9._-]*:)?[A-Za-z_][A-Za-z0-9._-]*$").unwrap()
});

static RE_ID_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[A-Za-z_][A-Za-z0-9._-]*)?$").unwrap());

// ── Bundled programs ────────────────────────────────────────────────────

const ADD_IDS_TOML: &str = include_str!("../../data/transforms/add-ids.toml");
const TEI2RDF_TOML: &str = include_str!("../../data/transforms/tei2rdf.toml");

// ── Compiled model ──────────────────────────────────────────────────────

/// What a program does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    AnnotateIds,
    RdfXml,
}

impl std::fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::AnnotateIds => "annotate-ids",
            Self::RdfXml => "rdf-xml",
        })
    }
}

/// Where a program came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramSource {
    Bundled,
    File(std::path::PathBuf),
}

/// An immutable, validated transform program.
#[derive(Debug, Clone)]
pub struct CompiledTransform {
    pub name: String,
    pub version: String,
    pub description: String,
    pub source: ProgramSource,
    pub body: TransformBody,
}

#[derive(Debug, Clone)]
pub enum TransformBody {
    AnnotateIds(IdSettings),
    RdfXml(RdfXmlProgram),
}

/// Settings of an `annotate-ids` program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSettings {
    /// Qualified attribute name, e.g. `xml:id`.
    pub attribute: String,
    pub prefix: String,
    /// Local names of elements never given an id.
    pub skip: HashSet<String>,
}

/// Namespaces and rules of an `rdf-xml` program.
#[derive(Debug, Clone)]
pub struct RdfXmlProgram {
    /// `(prefix, namespace IRI)` in declaration order, `rdf` first.
    pub namespaces: Vec<(String, String)>,
    pub rules: Vec<Rule>,
    /// Attribute that carries element identifiers.
    pub id_attribute: String,
}

/// Who a statement is about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectMode {
    #[default]
    Document,
    Element,
}

/// How a rendered value is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Literal,
    Resource,
}

/// Where a rule's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Whitespace- and NFC-normalized text content of the element.
    Text,
    Attribute(String),
    Constant(String),
    /// A reference to the element's own identifier (`#<id>`).
    ElementRef,
}

/// Restricts a rule to elements with a given attribute (and value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub attribute: String,
    pub equals: Option<String>,
}

/// A `/`-separated local-name path, matched against the end of the current
/// element path. `*` matches any single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    pub steps: Vec<String>,
    pub anchored: bool,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Option<Self> {
        let anchored = pattern.starts_with('/');
        let steps: Vec<String> = pattern
            .trim_start_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        let valid = steps
            .iter()
            .all(|s| s == "*" || RE_NCNAME.is_match(s));
        (valid && !steps.is_empty()).then_some(Self { steps, anchored })
    }

    /// Whether the element at the end of `path` matches.
    pub fn matches<S: AsRef<str>>(&self, path: &[S]) -> bool {
        if path.len() < self.steps.len() || (self.anchored && path.len() != self.steps.len()) {
            return false;
        }
        let tail = &path[path.len() - self.steps.len()..];
        self.steps
            .iter()
            .zip(tail)
            .all(|(step, name)| step == "*" || step == name.as_ref())
    }
}

/// One compiled rendering rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Position in the program, 1-based, for diagnostics.
    pub index: usize,
    pub pattern: PathPattern,
    /// Prefixed predicate name as written into the output.
    pub predicate: String,
    pub subject: SubjectMode,
    pub node: NodeKind,
    pub when: Option<Condition>,
    pub source: ValueSource,
}

// ── TOML form ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgramToml {
    program: ProgramMeta,
    ids: Option<IdsToml>,
    #[serde(default)]
    namespaces: BTreeMap<String, String>,
    #[serde(default)]
    rules: Vec<RuleToml>,
}

#[derive(Debug, Deserialize)]
struct ProgramMeta {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    kind: String,
    #[serde(default = "default_id_attribute")]
    id_attribute: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IdsToml {
    #[serde(default = "default_id_attribute")]
    attribute: String,
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    skip: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleToml {
    #[serde(rename = "match")]
    path: String,
    predicate: String,
    #[serde(default)]
    subject: SubjectMode,
    node: Option<NodeKind>,
    when: Option<ConditionToml>,
    #[serde(default)]
    text: bool,
    attribute: Option<String>,
    constant: Option<String>,
    #[serde(default)]
    element_ref: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionToml {
    attribute: String,
    equals: Option<String>,
}

fn default_id_attribute() -> String {
    "xml:id".into()
}

// ── Compilation ─────────────────────────────────────────────────────────

impl CompiledTransform {
    /// Parse and validate a program from TOML text.
    pub fn compile(toml_str: &str, source: ProgramSource) -> ProgramResult<Self> {
        let origin = match &source {
            ProgramSource::Bundled => "(bundled)".to_string(),
            ProgramSource::File(path) => path.display().to_string(),
        };
        let parsed: ProgramToml = toml::from_str(toml_str).map_err(|e| ProgramError::Parse {
            name: origin,
            message: e.to_string(),
        })?;

        let meta = parsed.program;
        let invalid = |message: String| ProgramError::Invalid {
            name: meta.name.clone(),
            message,
        };

        let body = match meta.kind.as_str() {
            "annotate-ids" => {
                if !parsed.rules.is_empty() {
                    return Err(invalid("annotate-ids programs take no [[rules]]".into()));
                }
                TransformBody::AnnotateIds(compile_ids(parsed.ids, &invalid)?)
            }
            "rdf-xml" => {
                if parsed.ids.is_some() {
                    return Err(invalid("rdf-xml programs take no [ids] table".into()));
                }
                if !RE_QNAME.is_match(&meta.id_attribute) {
                    return Err(invalid(format!(
                        "id_attribute \"{}\" is not a qualified name",
                        meta.id_attribute
                    )));
                }
                TransformBody::RdfXml(compile_rdf_xml(
                    parsed.namespaces,
                    parsed.rules,
                    meta.id_attribute.clone(),
                    &invalid,
                )?)
            }
            other => return Err(invalid(format!("unknown program kind \"{other}\""))),
        };

        Ok(Self {
            name: meta.name,
            version: meta.version,
            description: meta.description,
            source,
            body,
        })
    }

    /// Read and compile a program file.
    pub fn load(path: &Path) -> ProgramResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ProgramError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::compile(&content, ProgramSource::File(path.to_path_buf()))
    }

    /// The bundled stage-1 program (`add-ids`).
    pub fn bundled_identify() -> ProgramResult<Self> {
        Self::compile(ADD_IDS_TOML, ProgramSource::Bundled)
    }

    /// The bundled stage-2 program (`tei2rdf`).
    pub fn bundled_encode() -> ProgramResult<Self> {
        Self::compile(TEI2RDF_TOML, ProgramSource::Bundled)
    }

    pub fn kind(&self) -> ProgramKind {
        match self.body {
            TransformBody::AnnotateIds(_) => ProgramKind::AnnotateIds,
            TransformBody::RdfXml(_) => ProgramKind::RdfXml,
        }
    }

    /// Fail unless this program has the given kind.
    pub fn expect_kind(&self, expected: ProgramKind) -> ProgramResult<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(ProgramError::WrongKind {
                name: self.name.clone(),
                expected: expected.to_string(),
                actual: self.kind().to_string(),
            })
        }
    }

    /// Number of rendering rules (zero for `annotate-ids` programs).
    pub fn rule_count(&self) -> usize {
        match &self.body {
            TransformBody::AnnotateIds(_) => 0,
            TransformBody::RdfXml(p) => p.rules.len(),
        }
    }
}

fn compile_ids(
    ids: Option<IdsToml>,
    invalid: &dyn Fn(String) -> ProgramError,
) -> ProgramResult<IdSettings> {
    let ids = ids.unwrap_or(IdsToml {
        attribute: default_id_attribute(),
        prefix: String::new(),
        skip: Vec::new(),
    });
    if !RE_QNAME.is_match(&ids.attribute) {
        return Err(invalid(format!(
            "id attribute \"{}\" is not a qualified name",
            ids.attribute
        )));
    }
    if !RE_ID_PREFIX.is_match(&ids.prefix) {
        return Err(invalid(format!(
            "id prefix \"{}\" cannot start an XML name",
            ids.prefix
        )));
    }
    if let Some(bad) = ids.skip.iter().find(|s| !RE_NCNAME.is_match(s)) {
        return Err(invalid(format!("skip entry \"{bad}\" is not an element name")));
    }
    Ok(IdSettings {
        attribute: ids.attribute,
        prefix: ids.prefix,
        skip: ids.skip.into_iter().collect(),
    })
}

fn compile_rdf_xml(
    declared: BTreeMap<String, String>,
    rules: Vec<RuleToml>,
    id_attribute: String,
    invalid: &dyn Fn(String) -> ProgramError,
) -> ProgramResult<RdfXmlProgram> {
    let mut namespaces = vec![("rdf".to_string(), RDF_NS.to_string())];
    for (prefix, iri) in declared {
        if prefix == "rdf" {
            if iri != RDF_NS {
                return Err(invalid(format!("prefix rdf cannot be rebound to <{iri}>")));
            }
            continue;
        }
        if !RE_NCNAME.is_match(&prefix) {
            return Err(invalid(format!("namespace prefix \"{prefix}\" is not a name")));
        }
        if NamedNode::new(&iri).is_err() {
            return Err(invalid(format!(
                "namespace \"{prefix}\" is not an absolute IRI: \"{iri}\""
            )));
        }
        namespaces.push((prefix, iri));
    }

    let compiled = rules
        .into_iter()
        .enumerate()
        .map(|(i, rule)| compile_rule(i + 1, rule, &namespaces, invalid))
        .collect::<ProgramResult<Vec<_>>>()?;

    Ok(RdfXmlProgram {
        namespaces,
        rules: compiled,
        id_attribute,
    })
}

fn compile_rule(
    index: usize,
    rule: RuleToml,
    namespaces: &[(String, String)],
    invalid: &dyn Fn(String) -> ProgramError,
) -> ProgramResult<Rule> {
    let at = |message: String| invalid(format!("rule {index} ({}): {message}", rule.path));

    let pattern = PathPattern::parse(&rule.path)
        .ok_or_else(|| at("match must be a non-empty path of element names".into()))?;

    let (prefix, local) = rule
        .predicate
        .split_once(':')
        .ok_or_else(|| at(format!("predicate \"{}\" has no prefix", rule.predicate)))?;
    if !namespaces.iter().any(|(p, _)| p == prefix) {
        return Err(at(format!("predicate prefix \"{prefix}\" is not declared")));
    }
    if !RE_NCNAME.is_match(local) {
        return Err(at(format!("predicate local name \"{local}\" is not a name")));
    }

    let mut sources = Vec::new();
    if rule.text {
        sources.push(ValueSource::Text);
    }
    if let Some(attribute) = &rule.attribute {
        if !RE_QNAME.is_match(attribute) {
            return Err(at(format!("attribute \"{attribute}\" is not a qualified name")));
        }
        sources.push(ValueSource::Attribute(attribute.clone()));
    }
    if let Some(constant) = &rule.constant {
        sources.push(ValueSource::Constant(constant.clone()));
    }
    if rule.element_ref {
        sources.push(ValueSource::ElementRef);
    }
    let source = match sources.len() {
        1 => sources.remove(0),
        0 => return Err(at("no value source (text, attribute, constant, element_ref)".into())),
        n => return Err(at(format!("{n} value sources given, expected exactly one"))),
    };

    let node = match (&source, rule.node) {
        (ValueSource::ElementRef, Some(NodeKind::Literal)) => {
            return Err(at("element_ref values are always resources".into()));
        }
        (ValueSource::ElementRef, _) => NodeKind::Resource,
        (_, node) => node.unwrap_or(NodeKind::Literal),
    };

    let when = match rule.when {
        Some(c) if !RE_QNAME.is_match(&c.attribute) => {
            return Err(at(format!("when.attribute \"{}\" is not a qualified name", c.attribute)));
        }
        Some(c) => Some(Condition {
            attribute: c.attribute,
            equals: c.equals,
        }),
        None => None,
    };

    Ok(Rule {
        index,
        pattern,
        predicate: rule.predicate,
        subject: rule.subject,
        node,
        when,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(toml: &str) -> ProgramResult<CompiledTransform> {
        CompiledTransform::compile(toml, ProgramSource::Bundled)
    }

    #[test]
    fn bundled_programs_compile() {
        let identify = CompiledTransform::bundled_identify().unwrap();
        assert_eq!(identify.kind(), ProgramKind::AnnotateIds);
        let encode = CompiledTransform::bundled_encode().unwrap();
        assert_eq!(encode.kind(), ProgramKind::RdfXml);
        assert!(encode.rule_count() > 0);
    }

    #[test]
    fn path_pattern_matches_suffix() {
        let p = PathPattern::parse("publicationStmt/publisher").unwrap();
        assert!(p.matches(&["TEI", "teiHeader", "publicationStmt", "publisher"]));
        assert!(!p.matches(&["TEI", "publisher"]));

        let anchored = PathPattern::parse("/TEI/*").unwrap();
        assert!(anchored.matches(&["TEI", "text"]));
        assert!(!anchored.matches(&["x", "TEI", "text"]));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = compile(
            r#"
[program]
name = "x"
version = "1"
kind = "xslt"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown program kind"));
    }

    #[test]
    fn rejects_undeclared_prefix() {
        let err = compile(
            r#"
[program]
name = "x"
version = "1"
kind = "rdf-xml"

[[rules]]
match = "title"
predicate = "dc:title"
text = true
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ProgramError::Invalid { .. }));
        assert!(err.to_string().contains("not declared"));
    }

    #[test]
    fn rejects_two_value_sources() {
        let err = compile(
            r#"
[program]
name = "x"
version = "1"
kind = "rdf-xml"

[namespaces]
dc = "http://purl.org/dc/elements/1.1/"

[[rules]]
match = "title"
predicate = "dc:title"
text = true
constant = "fixed"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("2 value sources"));
    }

    #[test]
    fn rejects_empty_match() {
        let err = compile(
            r#"
[program]
name = "x"
version = "1"
kind = "rdf-xml"

[namespaces]
dc = "http://purl.org/dc/elements/1.1/"

[[rules]]
match = ""
predicate = "dc:title"
text = true
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("match"));
    }

    #[test]
    fn element_ref_defaults_to_resource() {
        let program = compile(
            r#"
[program]
name = "x"
version = "1"
kind = "rdf-xml"

[namespaces]
dcterms = "http://purl.org/dc/terms/"

[[rules]]
match = "div"
predicate = "dcterms:hasPart"
element_ref = true
"#,
        )
        .unwrap();
        let TransformBody::RdfXml(body) = program.body else {
            panic!("expected rdf-xml body");
        };
        assert_eq!(body.rules[0].node, NodeKind::Resource);
        assert_eq!(body.namespaces[0].0, "rdf");
    }

    #[test]
    fn wrong_kind_is_reported() {
        let identify = CompiledTransform::bundled_identify().unwrap();
        let err = identify.expect_kind(ProgramKind::RdfXml).unwrap_err();
        assert!(matches!(err, ProgramError::WrongKind { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = CompiledTransform::load(Path::new("/nonexistent/program.toml")).unwrap_err();
        assert!(matches!(err, ProgramError::Io { .. }));
    }
}
