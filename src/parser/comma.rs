use super::{
    assemble,
    read_records,
    CsvFormat,
    CsvParser,
    Directives,
    HeaderMode,
    ParsedCsv,
};
use crate::core::KotoError;

/// Standard quoted CSV: fields may be wrapped in double quotes to hold the delimiter or a
/// newline, and `""` inside quotes is a literal quote.
#[derive(Debug, Clone)]
pub struct CommaParser {
    delimiter: u8,
}

impl Default for CommaParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CommaParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

impl CsvParser for CommaParser {
    fn format(&self) -> CsvFormat {
        CsvFormat::Comma
    }

    fn parse(&self, text: &str, header_mode: HeaderMode) -> Result<ParsedCsv, KotoError> {
        let records = read_records(text, self.delimiter, 0)?;
        assemble(self.format(), records, header_mode, None, Directives::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedCsv {
        CommaParser::new().parse(text, HeaderMode::Detect).unwrap()
    }

    #[test]
    fn test_basic_with_header() {
        let parsed = parse("Japanese,English,Tags\n猫,cat,animal\n");
        assert_eq!(parsed.headers.names(), &["Japanese", "English", "Tags"]);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].values(), &["猫", "cat", "animal"]);
        assert_eq!(parsed.rows[0].line(), 2);
    }

    #[test]
    fn test_quoted_fields() {
        let parsed = parse(
            "Japanese,English,Example\n\
             猫,\"cat, feline\",\"He said \"\"meow\"\"\"\n\
             犬,dog,\"line one\nline two\"\n",
        );
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].get(1), Some("cat, feline"));
        assert_eq!(parsed.rows[0].get(2), Some("He said \"meow\""));
        assert_eq!(parsed.rows[1].get(2), Some("line one\nline two"));
        assert!(parsed.rows.iter().all(|row| row.len() == parsed.headers.len()));
    }

    #[test]
    fn test_headerless_synthesizes_columns() {
        let parsed = parse("猫,cat\n犬,dog\n");
        assert_eq!(parsed.headers.names(), &["Column 1", "Column 2"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].line(), 1);
    }

    #[test]
    fn test_header_detected_by_script() {
        let parsed = parse("Item,Gloss\n猫,cat\n");
        assert_eq!(parsed.headers.names(), &["Item", "Gloss"]);
        assert_eq!(parsed.rows.len(), 1);
    }

    #[test]
    fn test_declared_header_modes() {
        let parser = CommaParser::new();

        let parsed = parser.parse("Japanese,English\n猫,cat\n", HeaderMode::Absent).unwrap();
        assert_eq!(parsed.headers.names(), &["Column 1", "Column 2"]);
        assert_eq!(parsed.rows.len(), 2);

        let parsed = parser.parse("猫,cat\n犬,dog\n", HeaderMode::Present).unwrap();
        assert_eq!(parsed.headers.names(), &["猫", "cat"]);
        assert_eq!(parsed.rows.len(), 1);
    }

    #[test]
    fn test_field_count_mismatch() {
        let err = CommaParser::new()
            .parse("Japanese,English\n猫,cat\n犬,dog,extra\n", HeaderMode::Detect)
            .unwrap_err();

        match err {
            KotoError::MalformedInput { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("expected 2 fields, found 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_short_row_is_not_padded() {
        let err =
            CommaParser::new().parse("Japanese,English\n猫\n", HeaderMode::Detect).unwrap_err();
        assert!(matches!(err, KotoError::MalformedInput { line: 2, .. }));
    }

    #[test]
    fn test_blank_lines_ignored() {
        let parsed = parse("Japanese,English\n\n猫,cat\n\n");
        assert_eq!(parsed.rows.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let parsed = parse("");
        assert!(parsed.headers.is_empty());
        assert!(parsed.rows.is_empty());
    }

    #[test]
    fn test_custom_delimiter() {
        let parsed = CommaParser::new()
            .with_delimiter(b';')
            .parse("Japanese;English\n猫;cat, feline\n", HeaderMode::Detect)
            .unwrap();
        assert_eq!(parsed.rows[0].get(1), Some("cat, feline"));
    }
}
