// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;

struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

/// Source text plus a line table for diagnostics.
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: &str, contents: &str) -> Source {
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() || contents.is_empty() {
            lines.push((start, contents.len() as u32));
        } else {
            let s = contents.len() as u32;
            lines.push((s, s));
        }
        Self {
            src: Rc::new(SourceInternal {
                file: file.to_string(),
                contents: contents.to_string(),
                lines,
            }),
        }
    }

    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    /// 1-based line and column (in chars) of a byte offset.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let offset = offset.min(self.src.contents.len()) as u32;
        let idx = self
            .src
            .lines
            .iter()
            .rposition(|(start, _)| *start <= offset)
            .unwrap_or(0);
        let (start, _) = self.src.lines[idx];
        let col = self.src.contents[start as usize..offset as usize]
            .chars()
            .count();
        (idx as u32 + 1, col as u32 + 1)
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line as usize > self.src.lines.len() || line == 0 {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = col.saturating_sub(1) as usize;

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
		{:<line_num_width$}| {}\n\
		{:<line_num_width$}| {:<col_spaces$}^\n\
		{}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }
}

/// Character cursor over source text. The parser works directly on characters, so
/// there is no separate token stream; positions are byte offsets so that the parser
/// can save and restore them when it backtracks.
#[derive(Clone)]
pub struct Scanner<'source> {
    text: &'source str,
    pos: usize,
}

impl<'source> Scanner<'source> {
    pub fn new(text: &'source str) -> Self {
        Self { text, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn rest(&self) -> &'source str {
        &self.text[self.pos..]
    }

    pub fn slice(&self, start: usize, end: usize) -> &'source str {
        &self.text[start..end]
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    pub fn peek(&self) -> char {
        self.rest().chars().next().unwrap_or('\x00')
    }

    pub fn peekahead(&self, n: usize) -> char {
        self.rest().chars().nth(n).unwrap_or('\x00')
    }

    pub fn bump(&mut self) -> char {
        match self.rest().chars().next() {
            Some(ch) => {
                self.pos += ch.len_utf8();
                ch
            }
            None => '\x00',
        }
    }

    pub fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    /// Consume `s` if the input continues with it.
    pub fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Consume keyword `kw` only when it is not the prefix of a longer identifier.
    pub fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.starts_with(kw) {
            let next = self.rest()[kw.len()..].chars().next().unwrap_or('\x00');
            if !is_ident_char(next) {
                self.pos += kw.len();
                return true;
            }
        }
        false
    }

    /// Skip whitespace and `//` or `/* */` comments.
    pub fn skip_ws(&mut self) {
        loop {
            let ch = self.peek();
            if ch.is_whitespace() {
                self.bump();
            } else if self.starts_with("//") {
                while !self.at_end() && self.peek() != '\n' {
                    self.bump();
                }
            } else if self.starts_with("/*") {
                match self.rest()[2..].find("*/") {
                    Some(end) => self.pos += end + 4,
                    None => self.pos = self.text.len(),
                }
            } else {
                break;
            }
        }
    }

    pub fn read_ident(&mut self) -> Option<&'source str> {
        let start = self.pos;
        if !is_ident_start(self.peek()) {
            return None;
        }
        while is_ident_char(self.peek()) {
            self.bump();
        }
        Some(&self.text[start..self.pos])
    }

    fn read_digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_ascii_digit() || (self.peek() == '_' && self.pos > start) {
            self.bump();
        }
        self.pos - start
    }

    /// Read a decimal number with optional fraction and exponent. Underscores are
    /// allowed as digit separators.
    pub fn read_number(&mut self) -> Option<f64> {
        let start = self.pos;
        let int_digits = self.read_digits();
        let mut frac_digits = 0;
        if self.peek() == '.' && self.peekahead(1).is_ascii_digit() {
            self.bump();
            frac_digits = self.read_digits();
        }
        if int_digits == 0 && frac_digits == 0 {
            self.pos = start;
            return None;
        }
        if matches!(self.peek(), 'e' | 'E') {
            let save = self.pos;
            self.bump();
            if matches!(self.peek(), '+' | '-') {
                self.bump();
            }
            if self.read_digits() == 0 {
                self.pos = save;
            }
        }
        let text: String = self.text[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        text.parse::<f64>().ok()
    }
}

pub fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

pub fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}
