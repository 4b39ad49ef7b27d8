//! Stateful transform engines.
//!
//! A [`TransformEngine`] executes one compiled program over one document at a
//! time. It keeps per-run state (warnings, run count) and is therefore not
//! shareable; the [`EnginePool`](super::pool::EnginePool) hands engines out
//! exclusively and resets them when they come back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use unicode_normalization::UnicodeNormalization;

use crate::error::{TransformError, TransformResult};
use crate::transform::Stage;
use crate::transform::program::{
    CompiledTransform, IdSettings, NodeKind, RdfXmlProgram, Rule, SubjectMode, TransformBody,
    ValueSource,
};
use crate::xml::{EntityTable, check_well_formed, line_column, normalize_space};

/// A recoverable problem met while running a program. Logged, never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformWarning {
    pub stage: Stage,
    pub message: String,
}

/// Executes one compiled program. Not safe for concurrent use.
#[derive(Debug)]
pub struct TransformEngine {
    program: Arc<CompiledTransform>,
    stage: Stage,
    warnings: Vec<TransformWarning>,
    runs: u64,
}

impl TransformEngine {
    pub fn new(program: Arc<CompiledTransform>, stage: Stage) -> Self {
        Self {
            program,
            stage,
            warnings: Vec::new(),
            runs: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn program(&self) -> &CompiledTransform {
        &self.program
    }

    /// Run the program over `input`.
    ///
    /// Input that is not a single well-formed XML document fails with
    /// [`TransformError::MalformedInput`].
    pub fn run(&mut self, input: &[u8]) -> TransformResult<Vec<u8>> {
        self.runs += 1;
        check_well_formed(input).map_err(|fault| {
            let (row, column) = fault.position(input);
            TransformError::MalformedInput {
                stage: self.stage,
                message: fault.message,
                row,
                column,
            }
        })?;

        let program = Arc::clone(&self.program);
        let output = match &program.body {
            TransformBody::AnnotateIds(settings) => self.annotate(settings, input)?,
            TransformBody::RdfXml(rdf) => self.render(rdf, input)?,
        };

        check_well_formed(&output).map_err(|fault| TransformError::UnusableOutput {
            stage: self.stage,
            message: fault.message,
        })?;
        Ok(output)
    }

    /// Warnings recorded since the last reset.
    pub fn warnings(&self) -> &[TransformWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<TransformWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Runs since the engine was created. Survives [`reset`](Self::reset).
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Drop all per-run state.
    pub fn reset(&mut self) {
        self.warnings.clear();
    }

    fn warn(&mut self, message: String) {
        tracing::warn!(
            stage = %self.stage,
            program = %self.program.name,
            "transform warning: {message}"
        );
        self.warnings.push(TransformWarning {
            stage: self.stage,
            message,
        });
    }

    fn malformed(&self, input: &[u8], offset: u64, message: impl ToString) -> TransformError {
        let (row, column) = line_column(input, offset as usize);
        TransformError::MalformedInput {
            stage: self.stage,
            message: message.to_string(),
            row,
            column,
        }
    }

    fn unusable(&self, message: impl ToString) -> TransformError {
        TransformError::UnusableOutput {
            stage: self.stage,
            message: message.to_string(),
        }
    }

    // ── annotate-ids ────────────────────────────────────────────────────

    fn annotate(&mut self, settings: &IdSettings, input: &[u8]) -> TransformResult<Vec<u8>> {
        let mut taken = self.existing_ids(settings, input)?;
        let mut counters: HashMap<String, usize> = HashMap::new();
        let mut reader = Reader::from_reader(input);
        let mut writer = Writer::new(Vec::with_capacity(input.len() + input.len() / 8));
        let mut entities = EntityTable::default();
        let mut added = 0usize;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| self.malformed(input, reader.buffer_position() as u64, e))?;
            let position = reader.buffer_position() as u64;
            let event = match event {
                Event::Eof => break,
                Event::DocType(d) => {
                    entities.declare(&d);
                    Event::DocType(d)
                }
                Event::Start(e) => {
                    let (e, fresh) = with_id(settings, e, &entities, &mut taken, &mut counters)
                        .map_err(|m| self.malformed(input, position, m))?;
                    added += usize::from(fresh);
                    Event::Start(e)
                }
                Event::Empty(e) => {
                    let (e, fresh) = with_id(settings, e, &entities, &mut taken, &mut counters)
                        .map_err(|m| self.malformed(input, position, m))?;
                    added += usize::from(fresh);
                    Event::Empty(e)
                }
                other => other,
            };
            writer
                .write_event(event)
                .map_err(|e| self.unusable(e))?;
        }

        tracing::debug!(stage = %self.stage, added, "identifiers assigned");
        Ok(writer.into_inner())
    }

    /// Identifiers already present in the document; generated ids avoid them.
    fn existing_ids(&self, settings: &IdSettings, input: &[u8]) -> TransformResult<HashSet<String>> {
        let mut reader = Reader::from_reader(input);
        let mut entities = EntityTable::default();
        let mut ids = HashSet::new();
        loop {
            match reader
                .read_event()
                .map_err(|e| self.malformed(input, reader.buffer_position() as u64, e))?
            {
                Event::DocType(d) => entities.declare(&d),
                Event::Start(e) | Event::Empty(e) => {
                    let attributes = read_attributes(&e, &entities)
                        .map_err(|m| self.malformed(input, reader.buffer_position() as u64, m))?;
                    if let Some((_, id)) = attributes.into_iter().find(|(k, _)| *k == settings.attribute) {
                        ids.insert(id);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(ids)
    }

    // ── rdf-xml ─────────────────────────────────────────────────────────

    fn render(&mut self, program: &RdfXmlProgram, input: &[u8]) -> TransformResult<Vec<u8>> {
        let mut reader = Reader::from_reader(input);
        let mut stack: Vec<Frame> = Vec::new();
        let mut statements = Statements::default();
        let mut entities = EntityTable::default();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| self.malformed(input, reader.buffer_position() as u64, e))?;
            let position = reader.buffer_position() as u64;
            match event {
                Event::DocType(d) => entities.declare(&d),
                Event::Start(e) => {
                    let frame = self.open(program, &e, &entities, &stack, &mut statements)
                        .map_err(|m| self.malformed(input, position, m))?;
                    stack.push(frame);
                }
                Event::Empty(e) => {
                    let frame = self.open(program, &e, &entities, &stack, &mut statements)
                        .map_err(|m| self.malformed(input, position, m))?;
                    self.close(program, frame, &mut statements);
                }
                Event::End(_) => {
                    if let Some(frame) = stack.pop() {
                        self.close(program, frame, &mut statements);
                    }
                }
                Event::Text(t) => {
                    let text = t
                        .unescape_with(|name| entities.resolve(name))
                        .map_err(|e| self.malformed(input, position, e))?;
                    append_text(&mut stack, &text);
                }
                Event::CData(c) => {
                    let raw = c.into_inner();
                    let text = std::str::from_utf8(&raw)
                        .map_err(|e| self.malformed(input, position, e))?;
                    append_text(&mut stack, text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        tracing::debug!(
            stage = %self.stage,
            subjects = statements.subjects.len(),
            statements = statements.len(),
            "statements rendered"
        );
        write_rdf_xml(program, &statements).map_err(|e| self.unusable(e))
    }

    /// Enter an element: apply every matching rule whose value is known now,
    /// and remember the text rules for when the element closes.
    fn open(
        &mut self,
        program: &RdfXmlProgram,
        element: &BytesStart<'_>,
        entities: &EntityTable,
        stack: &[Frame],
        statements: &mut Statements,
    ) -> Result<Frame, String> {
        let local = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
        let attributes = read_attributes(element, entities)?;
        let id = attributes
            .iter()
            .find(|(k, _)| *k == program.id_attribute)
            .map(|(_, v)| v.clone());

        let mut frame = Frame {
            local,
            id,
            attributes,
            pending: Vec::new(),
            text: None,
        };

        let path: Vec<&str> = stack
            .iter()
            .map(|f| f.local.as_str())
            .chain(std::iter::once(frame.local.as_str()))
            .collect();
        let matching: Vec<usize> = program
            .rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.pattern.matches(&path) && frame.satisfies(rule))
            .map(|(i, _)| i)
            .collect();

        for i in matching {
            let rule = &program.rules[i];
            if rule.source == ValueSource::Text {
                frame.pending.push(i);
                frame.text.get_or_insert_with(String::new);
                continue;
            }
            let value = match &rule.source {
                ValueSource::Attribute(name) => frame.attribute(name).map(str::to_string),
                ValueSource::Constant(value) => Some(value.clone()),
                ValueSource::ElementRef => frame.id.as_ref().map(|id| format!("#{id}")),
                ValueSource::Text => None,
            };
            match value {
                Some(value) => self.emit(rule, &frame, value, statements),
                None => self.warn(format!(
                    "rule {} ({}): <{}> has no {}; statement skipped",
                    rule.index,
                    rule.predicate,
                    frame.local,
                    match &rule.source {
                        ValueSource::Attribute(name) => name.as_str(),
                        _ => program.id_attribute.as_str(),
                    }
                )),
            }
        }
        Ok(frame)
    }

    /// Leave an element: resolve its pending text rules.
    fn close(&mut self, program: &RdfXmlProgram, frame: Frame, statements: &mut Statements) {
        if frame.pending.is_empty() {
            return;
        }
        let text: String = normalize_space(frame.text.as_deref().unwrap_or_default())
            .nfc()
            .collect();
        for &i in &frame.pending {
            let rule = &program.rules[i];
            if text.is_empty() {
                self.warn(format!(
                    "rule {} ({}): <{}> has no text; statement skipped",
                    rule.index, rule.predicate, frame.local
                ));
                continue;
            }
            self.emit(rule, &frame, text.clone(), statements);
        }
    }

    fn emit(&mut self, rule: &Rule, frame: &Frame, value: String, statements: &mut Statements) {
        let subject = match rule.subject {
            SubjectMode::Document => SubjectKey::Document,
            SubjectMode::Element => match &frame.id {
                Some(id) => SubjectKey::Element(id.clone()),
                None => {
                    self.warn(format!(
                        "rule {} ({}): <{}> has no identifier to describe; statement skipped",
                        rule.index, rule.predicate, frame.local
                    ));
                    return;
                }
            },
        };
        statements.push(
            subject,
            Statement {
                predicate: rule.predicate.clone(),
                node: rule.node,
                value,
            },
        );
    }
}

/// An open element during rendering.
#[derive(Debug)]
struct Frame {
    local: String,
    id: Option<String>,
    attributes: Vec<(String, String)>,
    /// Text rules waiting for the element to close.
    pending: Vec<usize>,
    /// Descendant text, collected only while rules are pending.
    text: Option<String>,
}

impl Frame {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn satisfies(&self, rule: &Rule) -> bool {
        match &rule.when {
            None => true,
            Some(condition) => match (self.attribute(&condition.attribute), &condition.equals) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
            },
        }
    }
}

fn append_text(stack: &mut [Frame], text: &str) {
    for frame in stack.iter_mut() {
        if let Some(buf) = frame.text.as_mut() {
            buf.push_str(text);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SubjectKey {
    Document,
    Element(String),
}

impl SubjectKey {
    fn about(&self) -> String {
        match self {
            Self::Document => String::new(),
            Self::Element(id) => format!("#{id}"),
        }
    }
}

#[derive(Debug)]
struct Statement {
    predicate: String,
    node: NodeKind,
    value: String,
}

/// Statements grouped by subject, subjects in first-seen order.
#[derive(Debug, Default)]
struct Statements {
    subjects: Vec<(SubjectKey, Vec<Statement>)>,
    index: HashMap<SubjectKey, usize>,
}

impl Statements {
    fn push(&mut self, subject: SubjectKey, statement: Statement) {
        let slot = match self.index.get(&subject) {
            Some(&slot) => slot,
            None => {
                self.subjects.push((subject.clone(), Vec::new()));
                self.index.insert(subject, self.subjects.len() - 1);
                self.subjects.len() - 1
            }
        };
        self.subjects[slot].1.push(statement);
    }

    fn len(&self) -> usize {
        self.subjects.iter().map(|(_, s)| s.len()).sum()
    }
}

/// Give `element` a fresh identifier unless it has one or is skipped.
/// Returns whether an identifier was added.
fn with_id<'a>(
    settings: &IdSettings,
    mut element: BytesStart<'a>,
    entities: &EntityTable,
    taken: &mut HashSet<String>,
    counters: &mut HashMap<String, usize>,
) -> Result<(BytesStart<'a>, bool), String> {
    let local = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
    if settings.skip.contains(&local) {
        return Ok((element, false));
    }
    if read_attributes(&element, entities)?
        .iter()
        .any(|(k, _)| *k == settings.attribute)
    {
        return Ok((element, false));
    }

    let counter = counters.entry(local.clone()).or_insert(0);
    let id = loop {
        *counter += 1;
        let candidate = format!("{}{}-{}", settings.prefix, local, counter);
        if taken.insert(candidate.clone()) {
            break candidate;
        }
    };
    element.push_attribute((settings.attribute.as_str(), id.as_str()));
    Ok((element, true))
}

fn read_attributes(
    element: &BytesStart<'_>,
    entities: &EntityTable,
) -> Result<Vec<(String, String)>, String> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value_with(|name| entities.resolve(name))
                .map_err(|e| e.to_string())?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

fn write_rdf_xml(program: &RdfXmlProgram, statements: &Statements) -> Result<Vec<u8>, String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| e.to_string())?;

    let mut root = BytesStart::new("rdf:RDF");
    for (prefix, iri) in &program.namespaces {
        let key = format!("xmlns:{prefix}");
        root.push_attribute((key.as_str(), iri.as_str()));
    }
    writer.write_event(Event::Start(root)).map_err(|e| e.to_string())?;

    for (subject, group) in &statements.subjects {
        let about = subject.about();
        let description =
            BytesStart::new("rdf:Description").with_attributes([("rdf:about", about.as_str())]);
        writer
            .write_event(Event::Start(description))
            .map_err(|e| e.to_string())?;

        for statement in group {
            let name = statement.predicate.as_str();
            match statement.node {
                NodeKind::Resource => {
                    let element = BytesStart::new(name)
                        .with_attributes([("rdf:resource", statement.value.as_str())]);
                    writer.write_event(Event::Empty(element)).map_err(|e| e.to_string())?;
                }
                NodeKind::Literal => {
                    writer
                        .write_event(Event::Start(BytesStart::new(name)))
                        .map_err(|e| e.to_string())?;
                    writer
                        .write_event(Event::Text(BytesText::new(&statement.value)))
                        .map_err(|e| e.to_string())?;
                    writer
                        .write_event(Event::End(BytesEnd::new(name)))
                        .map_err(|e| e.to_string())?;
                }
            }
        }

        writer
            .write_event(Event::End(BytesEnd::new("rdf:Description")))
            .map_err(|e| e.to_string())?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("rdf:RDF")))
        .map_err(|e| e.to_string())?;
    Ok(writer.into_inner())
}
