//! Shared XML helpers: well-formedness scanning and source positions.
//!
//! Both transform stages and the RDF/XML extractor need to tell "this is not
//! XML at all" apart from problems further downstream. The scan here is a
//! single `quick-xml` pass that checks tag balance, entity references and the
//! presence of a root element without building a tree.

use std::collections::HashMap;
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use regex::Regex;

static RE_ENTITY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([A-Za-z_][A-Za-z0-9._-]*)\s+(?:"([^"<&]*)"|'([^'<&]*)')\s*>"#)
        .unwrap()
});

/// A well-formedness failure with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlFault {
    pub message: String,
    pub offset: usize,
}

impl XmlFault {
    /// 1-based `(row, column)` of the fault within `input`.
    pub fn position(&self, input: &[u8]) -> (u64, u64) {
        line_column(input, self.offset)
    }
}

/// General entities declared in a document's internal DTD subset.
///
/// Only internal entities with plain-text replacement are recognized;
/// external and parameter entities, and values containing markup, are not.
/// Later declarations of the same name are ignored.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    entities: HashMap<String, String>,
}

impl EntityTable {
    /// Record the declarations found in the content of a `DOCTYPE` event.
    pub fn declare(&mut self, doctype: &[u8]) {
        let doctype = String::from_utf8_lossy(doctype);
        for caps in RE_ENTITY_DECL.captures_iter(&doctype) {
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            self.entities
                .entry(caps[1].to_string())
                .or_insert_with(|| value.to_string());
        }
    }

    /// Replacement text for `&name;`, predefined XML entities included.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.entities
            .get(name)
            .map(String::as_str)
            .or_else(|| resolve_predefined_entity(name))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Check that `input` is a single well-formed XML document.
///
/// Every entity reference in text and attribute values must resolve, either
/// to a predefined entity or to one declared in the internal subset.
pub fn check_well_formed(input: &[u8]) -> Result<(), XmlFault> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().check_end_names = true;
    let mut buf = Vec::new();
    let mut entities = EntityTable::default();
    let mut depth = 0usize;
    let mut roots = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| XmlFault {
            message: e.to_string(),
            offset: reader.buffer_position() as usize,
        })?;
        let fault = |message: String| XmlFault {
            message,
            offset: reader.buffer_position() as usize,
        };
        match event {
            Event::DocType(d) => entities.declare(&d),
            Event::Start(e) => {
                check_attributes(&e, &entities).map_err(fault)?;
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                check_attributes(&e, &entities).map_err(fault)?;
                if depth == 0 {
                    roots += 1;
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Text(t) => {
                let text = t
                    .unescape_with(|name| entities.resolve(name))
                    .map_err(|e| fault(e.to_string()))?;
                if depth == 0 && !text.trim().is_empty() {
                    return Err(XmlFault {
                        message: "text content outside the root element".into(),
                        offset: reader.buffer_position() as usize,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let offset = input.len();
    if depth > 0 {
        return Err(XmlFault {
            message: format!("unexpected end of document: {depth} element(s) left open"),
            offset,
        });
    }
    match roots {
        0 => Err(XmlFault {
            message: "document has no root element".into(),
            offset,
        }),
        1 => Ok(()),
        n => Err(XmlFault {
            message: format!("document has {n} root elements"),
            offset,
        }),
    }
}

fn check_attributes(
    element: &quick_xml::events::BytesStart<'_>,
    entities: &EntityTable,
) -> Result<(), String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        attr.unescape_value_with(|name| entities.resolve(name))
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Byte offset of the first attribute whose unescaped value is `value`.
///
/// The offset points at the attribute name. Used to place parser messages
/// that quote a value but carry no position of their own.
pub fn find_attribute_value(input: &[u8], value: &str) -> Option<usize> {
    let mut reader = Reader::from_reader(input);
    let mut entities = EntityTable::default();
    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event().ok()? {
            Event::DocType(d) => entities.declare(&d),
            Event::Start(e) | Event::Empty(e) => {
                let end = (reader.buffer_position() as usize).min(input.len());
                let tag = &input[start.min(end)..end];
                let name_len = e.name().as_ref().len() + 1;
                for attr in e.attributes().flatten() {
                    let matches = attr
                        .unescape_value_with(|name| entities.resolve(name))
                        .is_ok_and(|v| v == value);
                    if !matches {
                        continue;
                    }
                    let key = attr.key.as_ref();
                    let at = tag
                        .get(name_len..)
                        .and_then(|rest| rest.windows(key.len()).position(|w| w == key))
                        .map_or(0, |i| i + name_len);
                    return Some(start + at);
                }
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Convert a byte offset into a 1-based `(row, column)` pair.
pub fn line_column(input: &[u8], offset: usize) -> (u64, u64) {
    let end = offset.min(input.len());
    let prefix = &input[..end];
    let row = prefix.iter().filter(|b| **b == b'\n').count() as u64 + 1;
    let line_start = prefix
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let column = String::from_utf8_lossy(&prefix[line_start..]).chars().count() as u64 + 1;
    (row, column)
}

/// Collapse runs of whitespace and trim, the way XPath `normalize-space` does.
pub fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_document() {
        assert!(check_well_formed(b"<?xml version=\"1.0\"?>\n<a><b/>text</a>").is_ok());
    }

    #[test]
    fn rejects_mismatched_end_tag() {
        let fault = check_well_formed(b"<a>\n<b></c></a>").unwrap_err();
        assert!(!fault.message.is_empty());
    }

    #[test]
    fn rejects_unclosed_root() {
        let input = b"<a><b/>";
        let fault = check_well_formed(input).unwrap_err();
        assert_eq!(fault.position(input).0, 1);
    }

    #[test]
    fn rejects_empty_and_text_only_input() {
        assert!(check_well_formed(b"").is_err());
        assert!(check_well_formed(b"just words").is_err());
    }

    #[test]
    fn rejects_two_roots() {
        let fault = check_well_formed(b"<a/><b/>").unwrap_err();
        assert!(fault.message.contains("2 root"));
    }

    #[test]
    fn positions_are_one_based() {
        let input = b"ab\ncd\nef";
        assert_eq!(line_column(input, 0), (1, 1));
        assert_eq!(line_column(input, 4), (2, 2));
        assert_eq!(line_column(input, 100), (3, 3));
    }

    #[test]
    fn declared_entities_are_accepted() {
        let input = br#"<!DOCTYPE TEI [<!ENTITY foo "bar">]><TEI n="&foo;">a &foo; b</TEI>"#;
        assert!(check_well_formed(input).is_ok());
    }

    #[test]
    fn undeclared_entity_is_rejected_with_position() {
        let input = b"<TEI>\n<p>&foo;</p></TEI>";
        let fault = check_well_formed(input).unwrap_err();
        assert!(fault.message.contains("foo"), "{}", fault.message);
        assert_eq!(fault.position(input).0, 2);
    }

    #[test]
    fn entity_table_reads_internal_subset() {
        let mut table = EntityTable::default();
        table.declare(br#" TEI [<!ENTITY foo "bar"> <!ENTITY % pe "x"> <!ENTITY baz 'qux'> <!ENTITY foo "later">]"#);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("foo"), Some("bar"));
        assert_eq!(table.resolve("baz"), Some("qux"));
        assert_eq!(table.resolve("amp"), Some("&"));
        assert_eq!(table.resolve("pe"), None);
    }

    #[test]
    fn attribute_value_is_located_at_its_name() {
        let input = b"<r>\n  <p ex:q=\"x\" rdf:resource=\"bad iri\"/>\n</r>";
        let offset = find_attribute_value(input, "bad iri").unwrap();
        assert_eq!(line_column(input, offset), (2, 15));
        assert_eq!(find_attribute_value(input, "absent"), None);
    }

    #[test]
    fn normalize_space_collapses_runs() {
        assert_eq!(normalize_space("  a \n\t b  c "), "a b c");
    }
}
