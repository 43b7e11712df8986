//! Line scanner for CAPL source text.
//!
//! CAPL is line-oriented and indentation-hinted, so the "lexer" is a
//! scanner that records, for each significant line, its indentation
//! and trimmed text. Blank lines and `#` comments are dropped here;
//! they are insignificant at every nesting depth.

/// One significant source line.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    /// 1-based line number in the original file.
    pub number: u32,
    /// Count of leading whitespace characters.
    pub indent: usize,
    /// The line with surrounding whitespace removed. Never empty.
    pub text: String,
}

/// Scan source text into significant lines.
pub fn scan(src: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    for (idx, raw) in src.lines().enumerate() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let indent = raw.len() - raw.trim_start().len();
        lines.push(SourceLine {
            number: (idx + 1) as u32,
            indent,
            text: text.to_owned(),
        });
    }
    lines
}

/// Cursor over scanned lines, threaded through recursive descent so
/// every recursive call advances a single shared position.
#[derive(Debug)]
pub struct Cursor {
    lines: Vec<SourceLine>,
    pos: usize,
}

impl Cursor {
    pub fn new(lines: Vec<SourceLine>) -> Self {
        Cursor { lines, pos: 0 }
    }

    /// The current line, or None at end of input.
    pub fn peek(&self) -> Option<&SourceLine> {
        self.lines.get(self.pos)
    }

    pub fn advance(&mut self) {
        if self.pos < self.lines.len() {
            self.pos += 1;
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_drops_blanks_and_comments() {
        let src = "IF user is All\n\n    # a comment\n    STATE enabled\n";
        let lines = scan(src);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "IF user is All");
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[1].text, "STATE enabled");
        assert_eq!(lines[1].number, 4);
        assert_eq!(lines[1].indent, 4);
    }

    #[test]
    fn scan_records_tab_indentation() {
        let lines = scan("IF x\n\tSTATE enabled\n");
        assert_eq!(lines[1].indent, 1);
    }

    #[test]
    fn cursor_advances_to_end() {
        let mut cursor = Cursor::new(scan("IF x\nEND\n"));
        assert_eq!(cursor.peek().unwrap().text, "IF x");
        cursor.advance();
        assert_eq!(cursor.peek().unwrap().text, "END");
        cursor.advance();
        assert!(cursor.is_at_end());
        cursor.advance();
        assert!(cursor.peek().is_none());
    }
}
