//! Byte-level lexer for SQL scripts
//!
//! Never fails: unterminated strings, quoted identifiers, dollar bodies and
//! block comments run to the end of the input.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexemeKind {
    Word,
    /// `"x"`, `` `x` `` or `[x]`
    QuotedIdent,
    StringLit,
    /// `$$ ... $$` or `$tag$ ... $tag$`, tags included
    DollarBody,
    Number,
    Symbol,
    /// An occurrence of a custom `DELIMITER`
    Delimiter,
    /// A `DELIMITER x`, `GO` or `/` line
    Directive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub kind: LexemeKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Lexeme<'a> {
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == LexemeKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_any_word(&self, keywords: &[&str]) -> bool {
        self.kind == LexemeKind::Word && keywords.iter().any(|k| self.text.eq_ignore_ascii_case(k))
    }

    pub fn is_symbol(&self, symbol: u8) -> bool {
        self.kind == LexemeKind::Symbol && self.text.as_bytes() == [symbol]
    }

    /// Word or quoted identifier
    pub fn is_name(&self) -> bool {
        matches!(self.kind, LexemeKind::Word | LexemeKind::QuotedIdent)
    }

    /// A statement boundary produced in script mode
    pub fn is_boundary(&self) -> bool {
        matches!(self.kind, LexemeKind::Delimiter | LexemeKind::Directive)
    }

    pub fn upper(&self) -> String {
        self.text.to_ascii_uppercase()
    }
}

/// Lex a single statement or fragment.
pub fn tokenize(src: &str) -> Vec<Lexeme<'_>> {
    Scanner::new(src, false).run()
}

/// Lex a whole script, recognizing `DELIMITER`, `GO` and `/` lines.
pub fn scan_script(src: &str) -> Vec<Lexeme<'_>> {
    Scanner::new(src, true).run()
}

/// Content of a single-quoted literal with `''` unescaped.
pub fn string_content(text: &str) -> String {
    let inner = text.strip_prefix('\'').unwrap_or(text);
    let inner = inner.strip_suffix('\'').unwrap_or(inner);
    inner.replace("''", "'")
}

/// Text between the opening and closing tags of a dollar-quoted body.
pub fn dollar_body_inner(text: &str) -> &str {
    if text.len() < 2 {
        return text;
    }
    let Some(tag_len) = text[1..].find('$').map(|i| i + 2) else {
        return text;
    };
    let tag = &text[..tag_len];
    if text.len() >= tag_len * 2 && text.ends_with(tag) {
        &text[tag_len..text.len() - tag_len]
    } else {
        &text[tag_len.min(text.len())..]
    }
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    script: bool,
    fresh_line: bool,
    delimiter: Option<String>,
    out: Vec<Lexeme<'a>>,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str, script: bool) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            script,
            fresh_line: true,
            delimiter: None,
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Lexeme<'a>> {
        let len = self.bytes.len();
        while self.pos < len {
            let b = self.bytes[self.pos];
            if b.is_ascii_whitespace() {
                if b == b'\n' {
                    self.fresh_line = true;
                }
                self.pos += 1;
                continue;
            }
            if self.script && self.fresh_line && self.directive() {
                continue;
            }
            let src = self.src;
            let delim_len = self
                .delimiter
                .as_deref()
                .filter(|d| src[self.pos..].starts_with(d))
                .map(str::len);
            if let Some(n) = delim_len {
                self.push(LexemeKind::Delimiter, self.pos, self.pos + n);
                continue;
            }

            let next = self.bytes.get(self.pos + 1).copied();
            match b {
                b'-' if next == Some(b'-') => self.skip_line(),
                b'/' if next == Some(b'*') => self.skip_block_comment(),
                b'#' if next.map_or(true, |c| c.is_ascii_whitespace() || c == b'#') => {
                    self.skip_line()
                }
                b'\'' => {
                    let end = self.quoted_end(self.pos, b'\'');
                    self.push(LexemeKind::StringLit, self.pos, end);
                }
                b'"' | b'`' => {
                    let end = self.quoted_end(self.pos, b);
                    self.push(LexemeKind::QuotedIdent, self.pos, end);
                }
                b'[' => match self.bracket_end(self.pos) {
                    Some(end) => self.push(LexemeKind::QuotedIdent, self.pos, end),
                    None => self.push(LexemeKind::Symbol, self.pos, self.pos + 1),
                },
                b'$' if self.delimiter.is_none() && self.dollar_tag_end(self.pos).is_some() => {
                    let end = self.dollar_body_end(self.pos);
                    self.push(LexemeKind::DollarBody, self.pos, end);
                }
                b'0'..=b'9' => {
                    let mut end = self.pos + 1;
                    while end < len
                        && (self.bytes[end].is_ascii_alphanumeric()
                            || self.bytes[end] == b'.'
                            || self.bytes[end] == b'_')
                    {
                        end += 1;
                    }
                    self.push(LexemeKind::Number, self.pos, end);
                }
                _ if is_word_start(b) => {
                    let end = self.word_end(self.pos + 1);
                    self.push(LexemeKind::Word, self.pos, end);
                }
                _ => self.push(LexemeKind::Symbol, self.pos, self.pos + 1),
            }
        }
        self.out
    }

    fn push(&mut self, kind: LexemeKind, start: usize, end: usize) {
        let src = self.src;
        let end = end.min(self.bytes.len());
        self.out.push(Lexeme {
            kind,
            text: &src[start..end],
            start,
            end,
        });
        self.pos = end;
        self.fresh_line = false;
    }

    fn line_end(&self) -> usize {
        self.src[self.pos..]
            .find('\n')
            .map(|i| self.pos + i)
            .unwrap_or(self.bytes.len())
    }

    /// `DELIMITER x`, `GO [n]` or `/` at the start of a line
    fn directive(&mut self) -> bool {
        let src = self.src;
        let line_end = self.line_end();
        let line = src[self.pos..line_end].trim_end();
        let mut parts = line.split_whitespace();
        let first = parts.next().unwrap_or_default();

        if line == "/" {
            self.push(LexemeKind::Directive, self.pos, self.pos + 1);
            self.pos = line_end;
            return true;
        }

        if first.eq_ignore_ascii_case("go") {
            let rest: Vec<&str> = parts.collect();
            let is_go = match rest.as_slice() {
                [] => true,
                [count] => count.bytes().all(|b| b.is_ascii_digit()),
                _ => false,
            };
            if is_go {
                self.push(LexemeKind::Directive, self.pos, self.pos + line.len());
                self.pos = line_end;
            }
            return is_go;
        }

        if first.eq_ignore_ascii_case("delimiter") {
            let Some(delim) = parts.next() else {
                return false;
            };
            if delim.bytes().any(|b| b.is_ascii_alphanumeric()) {
                return false;
            }
            let delim_start = self.pos + line.find(delim).unwrap_or(first.len());
            let end = delim_start + delim.len();
            self.delimiter = (delim != ";").then(|| delim.to_string());
            self.push(LexemeKind::Directive, self.pos, end);
            return true;
        }

        false
    }

    fn skip_line(&mut self) {
        self.pos = self.line_end();
    }

    fn skip_block_comment(&mut self) {
        self.pos = self.src[self.pos + 2..]
            .find("*/")
            .map(|i| self.pos + 2 + i + 2)
            .unwrap_or(self.bytes.len());
        self.fresh_line = false;
    }

    /// End of a quoted run; a doubled quote character is an escape
    fn quoted_end(&self, start: usize, quote: u8) -> usize {
        let len = self.bytes.len();
        let mut i = start + 1;
        while i < len {
            if self.bytes[i] == quote {
                if i + 1 < len && self.bytes[i + 1] == quote {
                    i += 2;
                    continue;
                }
                return i + 1;
            }
            i += 1;
        }
        len
    }

    // `[x]` only when closed on the same line, so `int[]` stays symbols
    fn bracket_end(&self, start: usize) -> Option<usize> {
        let rest = &self.bytes[start + 1..];
        let close = rest.iter().position(|&b| b == b']' || b == b'\n')?;
        (rest[close] == b']' && close > 0).then_some(start + 1 + close + 1)
    }

    /// Index of the closing `$` of a `$$` or `$tag$` opener
    fn dollar_tag_end(&self, start: usize) -> Option<usize> {
        let len = self.bytes.len();
        let mut i = start + 1;
        if i < len && self.bytes[i] == b'$' {
            return Some(i);
        }
        if i < len && self.bytes[i].is_ascii_digit() {
            return None;
        }
        while i < len && (self.bytes[i].is_ascii_alphanumeric() || self.bytes[i] == b'_') {
            i += 1;
        }
        (i > start + 1 && i < len && self.bytes[i] == b'$').then_some(i)
    }

    fn dollar_body_end(&self, start: usize) -> usize {
        let Some(tag_end) = self.dollar_tag_end(start) else {
            return start + 1;
        };
        let tag = &self.src[start..=tag_end];
        self.src[tag_end + 1..]
            .find(tag)
            .map(|i| tag_end + 1 + i + tag.len())
            .unwrap_or(self.bytes.len())
    }

    fn word_end(&self, mut i: usize) -> usize {
        let len = self.bytes.len();
        while i < len {
            let b = self.bytes[i];
            let part = b.is_ascii_alphanumeric()
                || matches!(b, b'_' | b'#' | b'@')
                || b >= 0x80
                || (b == b'$' && self.bytes.get(i + 1) != Some(&b'$'));
            if !part {
                break;
            }
            i += 1;
        }
        i
    }
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || matches!(b, b'_' | b'@' | b'#') || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(LexemeKind, &str)> {
        tokenize(src).into_iter().map(|l| (l.kind, l.text)).collect()
    }

    #[test]
    fn test_tokenize_basic_statement() {
        assert_eq!(
            kinds("SELECT a, 'it''s' FROM [dbo].[T] -- trailing\n"),
            vec![
                (LexemeKind::Word, "SELECT"),
                (LexemeKind::Word, "a"),
                (LexemeKind::Symbol, ","),
                (LexemeKind::StringLit, "'it''s'"),
                (LexemeKind::Word, "FROM"),
                (LexemeKind::QuotedIdent, "[dbo]"),
                (LexemeKind::Symbol, "."),
                (LexemeKind::QuotedIdent, "[T]"),
            ]
        );
    }

    #[test]
    fn test_dollar_body_is_one_lexeme() {
        let lexemes = tokenize("AS $fn$ BEGIN; SELECT 1; END $fn$ LANGUAGE plpgsql");
        assert_eq!(lexemes[1].kind, LexemeKind::DollarBody);
        assert_eq!(dollar_body_inner(lexemes[1].text), " BEGIN; SELECT 1; END ");
        assert!(lexemes[2].is_word("language"));
    }

    #[test]
    fn test_end_dollar_splits_word() {
        let lexemes = scan_script("DELIMITER $$\nBEGIN SET x = 1; END$$\nDELIMITER ;\n");
        let texts: Vec<_> = lexemes.iter().map(|l| (l.kind, l.text)).collect();
        assert_eq!(texts[0], (LexemeKind::Directive, "DELIMITER $$"));
        assert!(texts.contains(&(LexemeKind::Word, "END")));
        assert!(texts.contains(&(LexemeKind::Delimiter, "$$")));
        assert_eq!(texts.last(), Some(&(LexemeKind::Directive, "DELIMITER ;")));
    }

    #[test]
    fn test_go_and_slash_directives() {
        let lexemes = scan_script("SELECT 1\nGO\nBEGIN NULL; END;\n/\n");
        let directives: Vec<_> = lexemes
            .iter()
            .filter(|l| l.kind == LexemeKind::Directive)
            .map(|l| l.text)
            .collect();
        assert_eq!(directives, vec!["GO", "/"]);
    }

    #[test]
    fn test_comments_and_temp_tables() {
        assert_eq!(
            kinds("/* block */ # note\nSELECT * FROM #tmp"),
            vec![
                (LexemeKind::Word, "SELECT"),
                (LexemeKind::Symbol, "*"),
                (LexemeKind::Word, "FROM"),
                (LexemeKind::Word, "#tmp"),
            ]
        );
    }

    #[test]
    fn test_unterminated_input_does_not_panic() {
        for src in ["'abc", "\"abc", "$$ body", "/* open", "[abc", "$"] {
            let _ = tokenize(src);
            let _ = scan_script(src);
        }
    }

    #[test]
    fn test_string_content_unescapes() {
        assert_eq!(string_content("'SELECT ''x'''"), "SELECT 'x'");
    }
}
