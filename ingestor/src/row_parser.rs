//! Delimiter-aware splitting of uploaded CSV/TSV text into rows of trimmed cells.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    pub fn as_char(&self) -> char {
        match self {
            Delimiter::Comma => ',',
            Delimiter::Tab => '\t',
        }
    }
}

/// How the delimiter is chosen for each data row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DelimiterMode {
    /// Every line picks its own delimiter
    #[default]
    PerLine,
    /// The header line's delimiter is used for the whole file
    Header,
}

impl fmt::Display for DelimiterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimiterMode::PerLine => write!(f, "line"),
            DelimiterMode::Header => write!(f, "header"),
        }
    }
}

impl FromStr for DelimiterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "line" | "per_line" | "per-line" => Ok(DelimiterMode::PerLine),
            "header" | "file" => Ok(DelimiterMode::Header),
            _ => Err(format!("Unknown delimiter detection mode: {}", s)),
        }
    }
}

/// Count unquoted commas and tabs; tab wins only on a strict majority.
pub fn detect_delimiter(line: &str) -> Delimiter {
    let mut in_quotes = false;
    let mut commas = 0usize;
    let mut tabs = 0usize;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => commas += 1,
            '\t' if !in_quotes => tabs += 1,
            _ => {}
        }
    }

    if tabs > commas { Delimiter::Tab } else { Delimiter::Comma }
}

/// Split one line, detecting its delimiter first.
pub fn parse_row(line: &str) -> Vec<String> {
    parse_row_with(line, detect_delimiter(line))
}

/// Split one line on `delimiter`. Double quotes toggle quoting and are dropped;
/// every cell is trimmed. Never returns an empty vector.
pub fn parse_row_with(line: &str, delimiter: Delimiter) -> Vec<String> {
    let delimiter = delimiter.as_char();
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == delimiter && !in_quotes {
            cells.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }

    cells.push(current.trim().to_string());
    cells
}

/// Non-blank lines of an upload body, with a leading byte-order mark removed.
pub fn split_lines(text: &str) -> Vec<&str> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    text.split('\n').filter(|line| !line.trim().is_empty()).collect()
}

/// Row splitter bound to one file's header
#[derive(Debug, Clone, Copy)]
pub struct RowParser {
    mode: DelimiterMode,
    header_delimiter: Delimiter,
}

impl RowParser {
    pub fn for_header(mode: DelimiterMode, header_line: &str) -> Self {
        Self { mode, header_delimiter: detect_delimiter(header_line) }
    }

    pub fn header_delimiter(&self) -> Delimiter {
        self.header_delimiter
    }

    pub fn parse(&self, line: &str) -> Vec<String> {
        match self.mode {
            DelimiterMode::PerLine => parse_row(line),
            DelimiterMode::Header => parse_row_with(line, self.header_delimiter),
        }
    }
}
