//! Streaming Turtle reader.
//!
//! One parser, four output modes matching the four RDF ingest targets:
//! `Resource` emits each distinct IRI once, `Literal` emits typed literal
//! values, and the two triple modes emit offset tuples resolved through the
//! resource table's primary-key index, populated by the preceding node
//! loads (the fixed plan order exists for this reason).

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use quiver_primitives::Offset;

use crate::error::{Error, Result};
use crate::storage::{IndexKey, PrimaryKeyIndex};
use crate::types::rdf::{RdfValue, XsdTag};
use crate::types::{DataChunk, Value, CHUNK_CAPACITY};

pub const RDF_TYPE_IRI: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RdfReaderMode {
    Resource,
    Literal,
    ResourceTriple,
    LiteralTriple,
}

/// Index handles the triple modes resolve against.
#[derive(Clone)]
pub struct RdfReaderContext {
    pub resource_index: Arc<RwLock<PrimaryKeyIndex>>,
}

#[derive(Clone, Debug, PartialEq)]
enum RdfTerm {
    Resource(String),
    Literal { lexical: String, datatype: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
struct Triple {
    subject: String,
    predicate: String,
    object: RdfTerm,
}

pub struct TurtleChunkReader {
    mode: RdfReaderMode,
    context: Option<RdfReaderContext>,
    pending_files: VecDeque<PathBuf>,
    file_index: usize,
    parser: Option<StatementParser>,
    /// Cross-file deduplication state for `Resource` mode.
    seen_iris: HashSet<String>,
    /// Running literal id for `LiteralTriple` mode; mirrors the serial ids
    /// the literal load assigned in the same emission order.
    next_literal_id: Offset,
    queued: VecDeque<Vec<Value>>,
}

impl TurtleChunkReader {
    pub fn open(
        paths: &[PathBuf],
        mode: RdfReaderMode,
        context: Option<RdfReaderContext>,
    ) -> Result<TurtleChunkReader> {
        let mut reader = TurtleChunkReader {
            mode,
            context,
            pending_files: paths.iter().cloned().collect(),
            file_index: 0,
            parser: None,
            seen_iris: HashSet::new(),
            next_literal_id: 0,
            queued: VecDeque::new(),
        };
        reader.advance_file()?;
        Ok(reader)
    }

    fn advance_file(&mut self) -> Result<bool> {
        match self.pending_files.pop_front() {
            Some(path) => {
                self.parser = Some(StatementParser::open(&path, self.file_index)?);
                self.file_index += 1;
                Ok(true)
            }
            None => {
                self.parser = None;
                Ok(false)
            }
        }
    }

    fn resolve(&self, iri: &str) -> Result<Offset> {
        let context = self
            .context
            .as_ref()
            .expect("triple modes require a resource index");
        context
            .resource_index
            .read()
            .lookup(&IndexKey::Str(iri.to_string()))
            .ok_or_else(|| Error::KeyNotFound {
                table: "resource".to_string(),
                key: iri.to_string(),
            })
    }

    fn emit(&mut self, triple: Triple) -> Result<()> {
        match self.mode {
            RdfReaderMode::Resource => {
                let mut iris = vec![triple.subject, triple.predicate];
                if let RdfTerm::Resource(object) = triple.object {
                    iris.push(object);
                }
                for iri in iris {
                    if self.seen_iris.insert(iri.clone()) {
                        self.queued.push_back(vec![Value::String(iri)]);
                    }
                }
            }
            RdfReaderMode::Literal => {
                if let RdfTerm::Literal { lexical, datatype } = triple.object {
                    let tag = datatype
                        .as_deref()
                        .map_or(XsdTag::Untyped, XsdTag::from_datatype_iri);
                    self.queued
                        .push_back(vec![Value::RdfVariant(RdfValue::new(tag, &lexical))]);
                }
            }
            RdfReaderMode::ResourceTriple => {
                if let RdfTerm::Resource(object) = &triple.object {
                    let row = vec![
                        Value::InternalId(self.resolve(&triple.subject)?),
                        Value::InternalId(self.resolve(&triple.predicate)?),
                        Value::InternalId(self.resolve(object)?),
                    ];
                    self.queued.push_back(row);
                }
            }
            RdfReaderMode::LiteralTriple => {
                if matches!(triple.object, RdfTerm::Literal { .. }) {
                    let literal_id = self.next_literal_id;
                    self.next_literal_id += 1;
                    let row = vec![
                        Value::InternalId(self.resolve(&triple.subject)?),
                        Value::InternalId(self.resolve(&triple.predicate)?),
                        Value::InternalId(literal_id),
                    ];
                    self.queued.push_back(row);
                }
            }
        }
        Ok(())
    }

    fn num_columns(&self) -> usize {
        match self.mode {
            RdfReaderMode::Resource | RdfReaderMode::Literal => 1,
            RdfReaderMode::ResourceTriple | RdfReaderMode::LiteralTriple => 3,
        }
    }
}

impl super::ChunkReader for TurtleChunkReader {
    fn next_chunk(&mut self) -> Result<Option<DataChunk>> {
        let mut chunk = DataChunk::new(self.num_columns());
        while chunk.num_rows() < CHUNK_CAPACITY {
            if let Some(row) = self.queued.pop_front() {
                chunk.push_row(row);
                continue;
            }
            let Some(parser) = self.parser.as_mut() else {
                break;
            };
            match parser.next_triple()? {
                Some(triple) => self.emit(triple)?,
                None => {
                    if !self.advance_file()? {
                        break;
                    }
                }
            }
        }
        if chunk.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

/// Parses one Turtle file into a triple stream. Handles prefix directives,
/// `a`, predicate (`;`) and object (`,`) lists, blank node labels, and
/// numeric / boolean shorthand literals. Collections and nested blank-node
/// property lists are outside the supported subset.
struct StatementParser {
    text: Vec<char>,
    pos: usize,
    path: String,
    file_index: usize,
    prefixes: HashMap<String, String>,
    blank_labels: HashMap<String, u64>,
    next_blank: u64,
    /// Expanded triples of the statement being drained.
    ready: VecDeque<Triple>,
}

impl StatementParser {
    fn open(path: &std::path::Path, file_index: usize) -> Result<StatementParser> {
        let text = std::fs::read_to_string(path)?;
        Ok(StatementParser {
            text: text.chars().collect(),
            pos: 0,
            path: path.display().to_string(),
            file_index,
            prefixes: HashMap::new(),
            blank_labels: HashMap::new(),
            next_blank: 0,
            ready: VecDeque::new(),
        })
    }

    fn next_triple(&mut self) -> Result<Option<Triple>> {
        loop {
            if let Some(triple) = self.ready.pop_front() {
                return Ok(Some(triple));
            }
            self.skip_trivia();
            if self.pos >= self.text.len() {
                return Ok(None);
            }
            if self.at_directive() {
                self.parse_directive()?;
                continue;
            }
            self.parse_statement()?;
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let line = self.text[..self.pos.min(self.text.len())]
            .iter()
            .filter(|c| **c == '\n')
            .count() as u64
            + 1;
        Error::ParseData {
            file: self.path.clone(),
            row: line,
            value: message.into(),
            dtype: crate::types::LogicalType::String,
        }
    }

    fn skip_trivia(&mut self) {
        while self.pos < self.text.len() {
            let c = self.text[self.pos];
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                while self.pos < self.text.len() && self.text[self.pos] != '\n' {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.text.get(self.pos).copied()
    }

    fn starts_with_keyword(&self, keyword: &str) -> bool {
        let upper: String = self
            .text
            .iter()
            .skip(self.pos)
            .take(keyword.len())
            .collect::<String>()
            .to_ascii_uppercase();
        upper == keyword
    }

    fn at_directive(&self) -> bool {
        self.peek() == Some('@')
            || self.starts_with_keyword("PREFIX ")
            || self.starts_with_keyword("BASE ")
    }

    fn parse_directive(&mut self) -> Result<()> {
        let sparql_form = self.peek() != Some('@');
        if !sparql_form {
            self.pos += 1;
        }
        let keyword = self.read_word();
        match keyword.to_ascii_lowercase().as_str() {
            "prefix" => {
                self.skip_trivia();
                let namespace = self.read_until(':');
                self.expect(':')?;
                self.skip_trivia();
                let iri = self.parse_iri_ref()?;
                self.prefixes.insert(namespace, iri);
            }
            "base" => {
                self.skip_trivia();
                let _ = self.parse_iri_ref()?;
            }
            other => return Err(self.error(format!("unknown directive @{other}"))),
        }
        self.skip_trivia();
        // Turtle directives end with '.', SPARQL-style ones do not.
        if !sparql_form {
            self.expect('.')?;
        } else if self.peek() == Some('.') {
            self.pos += 1;
        }
        Ok(())
    }

    fn read_word(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        self.text[start..self.pos].iter().collect()
    }

    fn read_until(&mut self, stop: char) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c != stop && !c.is_whitespace()) {
            self.pos += 1;
        }
        self.text[start..self.pos].iter().collect()
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!(
                "expected '{expected}', found {:?}",
                self.peek()
            )))
        }
    }

    /// `subject predicate objects (';' predicate objects)* '.'`
    fn parse_statement(&mut self) -> Result<()> {
        let subject = self.parse_resource_term()?;
        loop {
            self.skip_trivia();
            let predicate = self.parse_predicate()?;
            loop {
                self.skip_trivia();
                let object = self.parse_object_term()?;
                self.ready.push_back(Triple {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object,
                });
                self.skip_trivia();
                if self.peek() == Some(',') {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            match self.peek() {
                Some(';') => {
                    self.pos += 1;
                    self.skip_trivia();
                    // A trailing ';' before the final '.' is legal.
                    if self.peek() == Some('.') {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                Some('.') => {
                    self.pos += 1;
                    return Ok(());
                }
                other => {
                    return Err(self.error(format!("expected ';' or '.', found {other:?}")));
                }
            }
        }
    }

    fn parse_predicate(&mut self) -> Result<String> {
        if self.peek() == Some('a')
            && self
                .text
                .get(self.pos + 1)
                .map_or(true, |c| c.is_whitespace())
        {
            self.pos += 1;
            return Ok(RDF_TYPE_IRI.to_string());
        }
        self.parse_resource_term()
    }

    /// An IRI ref, prefixed name, or blank node, expanded to a full string.
    fn parse_resource_term(&mut self) -> Result<String> {
        self.skip_trivia();
        match self.peek() {
            Some('<') => self.parse_iri_ref(),
            Some('_') => self.parse_blank_node(),
            Some('[') => {
                self.pos += 1;
                self.skip_trivia();
                self.expect(']')?;
                let id = self.next_blank;
                self.next_blank += 1;
                Ok(format!("_:f{}_anon{id}", self.file_index))
            }
            Some(c) if c.is_alphanumeric() || c == ':' => self.parse_prefixed_name(),
            other => Err(self.error(format!("expected a resource term, found {other:?}"))),
        }
    }

    fn parse_iri_ref(&mut self) -> Result<String> {
        self.expect('<')?;
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '>') {
            self.pos += 1;
        }
        let iri: String = self.text[start..self.pos].iter().collect();
        self.expect('>')?;
        Ok(iri)
    }

    fn parse_blank_node(&mut self) -> Result<String> {
        self.expect('_')?;
        self.expect(':')?;
        let label = self.read_word();
        if label.is_empty() {
            return Err(self.error("blank node without a label"));
        }
        let id = match self.blank_labels.get(&label) {
            Some(id) => *id,
            None => {
                let id = self.next_blank;
                self.next_blank += 1;
                self.blank_labels.insert(label, id);
                id
            }
        };
        Ok(format!("_:f{}_b{id}", self.file_index))
    }

    fn parse_prefixed_name(&mut self) -> Result<String> {
        let namespace = self.read_until(':');
        self.expect(':')?;
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, ',' | ';' | '.' | ')' | ']'))
        {
            self.pos += 1;
        }
        let local: String = self.text[start..self.pos].iter().collect();
        let base = self
            .prefixes
            .get(&namespace)
            .ok_or_else(|| self.error(format!("undeclared prefix {namespace}:")))?;
        Ok(format!("{base}{local}"))
    }

    fn parse_object_term(&mut self) -> Result<RdfTerm> {
        match self.peek() {
            Some('"') => self.parse_literal(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => self.parse_numeric_literal(),
            Some('t') | Some('f') if self.at_boolean() => {
                let word = self.read_word();
                Ok(RdfTerm::Literal {
                    lexical: word,
                    datatype: Some(format!("{}boolean", crate::types::rdf::XSD)),
                })
            }
            _ => Ok(RdfTerm::Resource(self.parse_resource_term()?)),
        }
    }

    fn at_boolean(&self) -> bool {
        for keyword in ["true", "false"] {
            let matches = self
                .text
                .iter()
                .skip(self.pos)
                .take(keyword.len())
                .collect::<String>()
                == keyword;
            let followed_ok = self
                .text
                .get(self.pos + keyword.len())
                .map_or(true, |c| c.is_whitespace() || matches!(c, ',' | ';' | '.'));
            if matches && followed_ok {
                return true;
            }
        }
        false
    }

    fn parse_literal(&mut self) -> Result<RdfTerm> {
        self.expect('"')?;
        let mut lexical = String::new();
        loop {
            match self.peek() {
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    lexical.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                    self.pos += 1;
                }
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    lexical.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated string literal")),
            }
        }
        // Optional datatype or language tag.
        if self.peek() == Some('^') {
            self.pos += 1;
            self.expect('^')?;
            let datatype = match self.peek() {
                Some('<') => self.parse_iri_ref()?,
                _ => self.parse_prefixed_name()?,
            };
            return Ok(RdfTerm::Literal {
                lexical,
                datatype: Some(datatype),
            });
        }
        if self.peek() == Some('@') {
            self.pos += 1;
            let _lang = self.read_until_delim();
        }
        Ok(RdfTerm::Literal {
            lexical,
            datatype: None,
        })
    }

    fn read_until_delim(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| !c.is_whitespace() && !matches!(c, ',' | ';' | '.'))
        {
            self.pos += 1;
        }
        self.text[start..self.pos].iter().collect()
    }

    fn parse_numeric_literal(&mut self) -> Result<RdfTerm> {
        let token = self.read_until_delim();
        let datatype = if token.contains(['e', 'E']) {
            "double"
        } else if token.contains('.') {
            "decimal"
        } else {
            "integer"
        };
        Ok(RdfTerm::Literal {
            lexical: token,
            datatype: Some(format!("{}{datatype}", crate::types::rdf::XSD)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ChunkReader as _;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn write_ttl(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("g.ttl");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const SAMPLE: &str = r#"
        @prefix ex: <http://example.org/> .
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .
        ex:s1 ex:p1 ex:o1 .
        ex:s1 ex:p1 "42"^^xsd:integer .
    "#;

    fn drain(reader: &mut TurtleChunkReader) -> Vec<Vec<Value>> {
        let mut rows = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            for i in 0..chunk.num_rows() {
                rows.push(chunk.row(i));
            }
        }
        rows
    }

    #[test]
    fn resource_mode_deduplicates_iris() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ttl(&dir, SAMPLE);
        let mut reader =
            TurtleChunkReader::open(&[path], RdfReaderMode::Resource, None).unwrap();
        let rows = drain(&mut reader);
        let iris: Vec<String> = rows
            .into_iter()
            .map(|row| match &row[0] {
                Value::String(s) => s.clone(),
                other => panic!("expected a string, got {other:?}"),
            })
            .collect();
        assert_eq!(
            iris,
            vec![
                "http://example.org/s1".to_string(),
                "http://example.org/p1".to_string(),
                "http://example.org/o1".to_string(),
            ]
        );
    }

    #[test]
    fn literal_mode_emits_typed_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ttl(&dir, SAMPLE);
        let mut reader = TurtleChunkReader::open(&[path], RdfReaderMode::Literal, None).unwrap();
        let rows = drain(&mut reader);
        assert_eq!(rows.len(), 1);
        match &rows[0][0] {
            Value::RdfVariant(v) => {
                assert_eq!(v.tag, XsdTag::Integer);
                assert_eq!(v.lexical(), "42");
            }
            other => panic!("expected an rdf variant, got {other:?}"),
        }
    }

    #[test]
    fn triple_modes_resolve_through_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ttl(&dir, SAMPLE);
        let index = Arc::new(RwLock::new(PrimaryKeyIndex::new()));
        for (i, iri) in [
            "http://example.org/s1",
            "http://example.org/p1",
            "http://example.org/o1",
        ]
        .iter()
        .enumerate()
        {
            index.write().insert(IndexKey::Str(iri.to_string()), i as Offset);
        }
        let context = RdfReaderContext {
            resource_index: index,
        };
        let mut reader = TurtleChunkReader::open(
            std::slice::from_ref(&path),
            RdfReaderMode::ResourceTriple,
            Some(context.clone()),
        )
        .unwrap();
        let rows = drain(&mut reader);
        assert_eq!(
            rows,
            vec![vec![
                Value::InternalId(0),
                Value::InternalId(1),
                Value::InternalId(2)
            ]]
        );

        let mut reader =
            TurtleChunkReader::open(&[path], RdfReaderMode::LiteralTriple, Some(context)).unwrap();
        let rows = drain(&mut reader);
        assert_eq!(
            rows,
            vec![vec![
                Value::InternalId(0),
                Value::InternalId(1),
                Value::InternalId(0)
            ]]
        );
    }

    #[test]
    fn unresolved_iri_is_key_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ttl(&dir, SAMPLE);
        let context = RdfReaderContext {
            resource_index: Arc::new(RwLock::new(PrimaryKeyIndex::new())),
        };
        let mut reader =
            TurtleChunkReader::open(&[path], RdfReaderMode::ResourceTriple, Some(context)).unwrap();
        let err = reader.next_chunk().unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { .. }));
    }

    #[test]
    fn predicate_and_object_lists_expand() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ttl(
            &dir,
            r#"
            @prefix ex: <http://example.org/> .
            ex:s a ex:T ;
                 ex:p ex:a, ex:b .
        "#,
        );
        let mut reader = TurtleChunkReader::open(&[path], RdfReaderMode::Resource, None).unwrap();
        let rows = drain(&mut reader);
        // s, rdf:type, T, p, a, b: six distinct IRIs.
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn blank_nodes_get_stable_local_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ttl(
            &dir,
            r#"
            @prefix ex: <http://example.org/> .
            _:x ex:p ex:a .
            _:x ex:p ex:b .
            _:y ex:p ex:c .
        "#,
        );
        let mut reader = TurtleChunkReader::open(&[path], RdfReaderMode::Resource, None).unwrap();
        let rows = drain(&mut reader);
        let iris: HashSet<String> = rows
            .into_iter()
            .map(|row| match &row[0] {
                Value::String(s) => s.clone(),
                _ => unreachable!(),
            })
            .collect();
        // _:x appears twice but maps to one stable id.
        assert!(iris.contains("_:f0_b0"));
        assert!(iris.contains("_:f0_b1"));
        assert_eq!(iris.len(), 6);
    }

    #[test]
    fn numeric_and_boolean_shorthand_literals() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ttl(
            &dir,
            r#"
            @prefix ex: <http://example.org/> .
            ex:s ex:p 42 .
            ex:s ex:p 1.5 .
            ex:s ex:p true .
        "#,
        );
        let mut reader = TurtleChunkReader::open(&[path], RdfReaderMode::Literal, None).unwrap();
        let rows = drain(&mut reader);
        let tags: Vec<XsdTag> = rows
            .iter()
            .map(|row| match &row[0] {
                Value::RdfVariant(v) => v.tag,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(tags, vec![XsdTag::Integer, XsdTag::Decimal, XsdTag::Boolean]);
    }
}
