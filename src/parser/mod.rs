pub mod comma;
pub mod directive;

use std::{
    borrow::Cow,
    collections::HashSet,
};

pub use comma::CommaParser;
use csv::ReaderBuilder;
pub use directive::{
    DirectiveParser,
    Directives,
};
use encoding_rs::{
    Encoding,
    UTF_8,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    core::{
        utils::contains_japanese,
        KotoError,
    },
    mapping::CanonicalField,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvFormat {
    Comma,
    AnkiDirective,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    Present,
    Absent,
    #[default]
    Detect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    pub format: Option<CsvFormat>,
    pub headers: HeaderMode,
}

/// Ordered column names. Names are unique so they can key a mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSet {
    names: Vec<String>,
}

impl HeaderSet {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// `Column 1..N`, for files without a header line.
    pub fn synthesized(count: usize) -> Self {
        Self { names: (1..=count).map(|i| format!("Column {}", i)).collect() }
    }

    /// Builds headers from a header line: blank cells get positional names, repeats get a suffix.
    pub fn from_cells(cells: &[String]) -> Self {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(cells.len());

        for (idx, cell) in cells.iter().enumerate() {
            let base = match cell.trim() {
                "" => format!("Column {}", idx + 1),
                trimmed => trimmed.to_string(),
            };

            let mut name = base.clone();
            let mut suffix = 2;
            while !seen.insert(name.clone()) {
                name = format!("{} ({})", base, suffix);
                suffix += 1;
            }
            names.push(name);
        }

        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One data line. `line` is the 1-based source line the record starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    line: u64,
    values: Vec<String>,
}

impl RawRow {
    pub fn new(line: u64, values: Vec<String>) -> Self {
        Self { line, values }
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pairs each value with its column name.
    pub fn named<'a>(&'a self, headers: &'a HeaderSet) -> impl Iterator<Item = (&'a str, &'a str)> {
        headers.iter().zip(self.values.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCsv {
    pub format: CsvFormat,
    pub headers: HeaderSet,
    pub rows: Vec<RawRow>,
    #[serde(default)]
    pub directives: Directives,
}

impl ParsedCsv {
    pub fn sample(&self, count: usize) -> &[RawRow] {
        &self.rows[..count.min(self.rows.len())]
    }
}

/// A CSV dialect that turns decoded text into headers and rows.
pub trait CsvParser: Send + Sync {
    fn format(&self) -> CsvFormat;

    fn parse(&self, text: &str, header_mode: HeaderMode) -> Result<ParsedCsv, KotoError>;
}

/// Decodes raw bytes: a byte-order mark picks the encoding, otherwise strict UTF-8.
pub fn decode(bytes: &[u8]) -> Result<Cow<'_, str>, KotoError> {
    let (encoding, bom_len): (&'static Encoding, usize) =
        Encoding::for_bom(bytes).unwrap_or((UTF_8, 0));

    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        .ok_or(KotoError::Undecodable { encoding: encoding.name() })
}

pub fn sniff_format(text: &str) -> CsvFormat {
    let first = text.lines().map(str::trim_start).find(|line| !line.trim().is_empty());

    match first {
        Some(line) if DirectiveParser::is_directive_marker(line) => CsvFormat::AnkiDirective,
        _ => CsvFormat::Comma,
    }
}

pub fn parser_for(format: CsvFormat) -> Box<dyn CsvParser> {
    match format {
        CsvFormat::Comma => Box::new(CommaParser::default()),
        CsvFormat::AnkiDirective => Box::new(DirectiveParser),
    }
}

/// Decodes, picks the dialect (declared or sniffed), and parses.
pub fn parse(bytes: &[u8], options: &ParseOptions) -> Result<ParsedCsv, KotoError> {
    let text = decode(bytes)?;
    let format = options.format.unwrap_or_else(|| sniff_format(&text));
    let parsed = parser_for(format).parse(&text, options.headers)?;

    tracing::info!(
        "Parsed {:?} CSV: {} columns, {} rows",
        parsed.format,
        parsed.headers.len(),
        parsed.rows.len()
    );
    Ok(parsed)
}

/// Reads quoted, delimited records; `line_offset` is added to each record's line number.
pub(crate) fn read_records(
    text: &str,
    delimiter: u8,
    line_offset: u64,
) -> Result<Vec<RawRow>, KotoError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0) + line_offset;
            KotoError::MalformedInput { line, message: e.to_string() }
        })?;

        if record.len() == 1 && record.get(0).is_some_and(|v| v.trim().is_empty()) {
            continue;
        }

        let line = record.position().map(|p| p.line()).unwrap_or(0) + line_offset;
        rows.push(RawRow::new(line, record.iter().map(str::to_string).collect()));
    }

    Ok(rows)
}

fn looks_like_header(first: &RawRow, rest: &[RawRow]) -> bool {
    let names_a_field = first.values().iter().any(|cell| {
        let lowered = cell.trim().to_lowercase();
        CanonicalField::ALL.iter().any(|field| field.synonyms().contains(&lowered.as_str()))
    });
    if names_a_field {
        return true;
    }

    let first_has_japanese = first.values().iter().any(|cell| contains_japanese(cell));
    let later_has_japanese =
        rest.iter().any(|row| row.values().iter().any(|cell| contains_japanese(cell)));
    !first_has_japanese && later_has_japanese
}

/// Splits off the header line (or synthesizes one) and checks every row's width.
pub(crate) fn assemble(
    format: CsvFormat,
    mut records: Vec<RawRow>,
    header_mode: HeaderMode,
    explicit_headers: Option<Vec<String>>,
    directives: Directives,
) -> Result<ParsedCsv, KotoError> {
    let headers = match explicit_headers {
        Some(names) => HeaderSet::from_cells(&names),
        None if records.is_empty() => HeaderSet::default(),
        None => {
            let has_header = match header_mode {
                HeaderMode::Present => true,
                HeaderMode::Absent => false,
                HeaderMode::Detect => looks_like_header(&records[0], &records[1..]),
            };

            if has_header {
                let header_row = records.remove(0);
                HeaderSet::from_cells(header_row.values())
            } else {
                HeaderSet::synthesized(records[0].len())
            }
        }
    };

    if let Some(row) = records.iter().find(|row| row.len() != headers.len()) {
        return Err(KotoError::MalformedInput {
            line: row.line(),
            message: format!("expected {} fields, found {}", headers.len(), row.len()),
        });
    }

    Ok(ParsedCsv { format, headers, rows: records, directives })
}
