// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::dates;
use crate::lexer::*;
use crate::value::{Map, Value};

use std::collections::HashMap;
use std::rc::Rc;

/// A parse failure with its location in the source text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{rendered}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source.
    pub offset: usize,
    pub line: u32,
    pub column: u32,
    rendered: String,
}

impl ParseError {
    pub(crate) fn new(file: &str, text: &str, message: String, offset: usize) -> ParseError {
        let source = Source::from_contents(file, text);
        let (line, column) = source.position(offset);
        let rendered = source.message(line, column, "error", &message);
        ParseError {
            message,
            offset,
            line,
            column,
            rendered,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Require the entire (trimmed) input to be consumed.
    pub consume_all: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { consume_all: true }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub message: String,
    pub offset: usize,
}

pub(crate) type PResult<T> = Result<T, Failure>;

// Binary operator tokens per precedence level, loosest first, with the operation
// each desugars to.
const LEVELS: &[&[(&str, &str)]] = &[
    &[("and", "and"), ("&&", "and")],
    &[("or", "or"), ("||", "or"), ("??", "??")],
    &[("==", "=="), ("!=", "!=")],
    &[("<=", "<="), (">=", ">="), ("<", "<"), (">", ">"), ("in", "in")],
    &[("+", "+"), ("-", "-")],
    &[("/%", "/%"), ("*", "*"), ("/", "/"), ("%", "%")],
];

const OP_SYMBOLS: &[&str] = &[
    "/%", "<=", ">=", "==", "!=", "??", "&&", "||", "+", "-", "*", "/", "%", "<", ">",
];

/// Nesting of sub-expressions and unary operators after which parsing fails instead
/// of exhausting the stack.
pub(crate) const MAX_NESTING: usize = 256;

pub(crate) const TOO_DEEP: &str = "expression nested too deeply";

pub struct Parser<'source> {
    pub(crate) scanner: Scanner<'source>,
    depth: usize,
    // Parenthesized forms by start offset, with the offset they end at.
    parens: HashMap<usize, (PResult<Expr>, usize)>,
}

impl<'source> Parser<'source> {
    pub fn new(text: &'source str) -> Self {
        Self {
            scanner: Scanner::new(text),
            depth: 0,
            parens: HashMap::new(),
        }
    }

    /// Run `f` one nesting level deeper.
    pub(crate) fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.fail(TOO_DEEP));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub(crate) fn fail(&self, message: impl Into<String>) -> Failure {
        Failure {
            message: message.into(),
            offset: self.scanner.pos(),
        }
    }

    pub(crate) fn expect(&mut self, s: &str) -> PResult<()> {
        self.scanner.skip_ws();
        if self.scanner.eat(s) {
            Ok(())
        } else {
            Err(self.fail(format!("expected `{s}`")))
        }
    }

    /// Statements separated by `;`.
    pub(crate) fn program(&mut self) -> PResult<Expr> {
        let mut stmts = vec![];
        loop {
            self.scanner.skip_ws();
            if self.scanner.at_end() || matches!(self.scanner.peek(), ')' | '}' | ']') {
                break;
            }
            stmts.push(self.statement()?);
            self.scanner.skip_ws();
            if !self.scanner.eat(";") {
                break;
            }
        }
        Ok(match stmts.len() {
            0 => Expr::Literal(Value::Undefined),
            1 => stmts.remove(0),
            _ => Expr::operation("block", stmts),
        })
    }

    fn statement(&mut self) -> PResult<Expr> {
        self.scanner.skip_ws();
        let save = self.scanner.pos();
        for kw in ["let", "set"] {
            if !self.scanner.eat_keyword(kw) {
                continue;
            }
            self.scanner.skip_ws();
            let start = self.scanner.pos();
            if self.keypath().is_ok() {
                let path = self.scanner.slice(start, self.scanner.pos());
                self.scanner.skip_ws();
                if self.scanner.peek() == '='
                    && !self.scanner.starts_with("==")
                    && !self.scanner.starts_with("=>")
                {
                    self.scanner.bump();
                    let value = self.expr()?;
                    return Ok(Expr::operation(kw, vec![Expr::literal(path), value]));
                }
            }
            self.scanner.reset(save);
        }
        self.expr()
    }

    pub(crate) fn expr(&mut self) -> PResult<Expr> {
        self.nested(|p| p.binary(0))
    }

    fn binary(&mut self, level: usize) -> PResult<Expr> {
        if level == LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        loop {
            let save = self.scanner.pos();
            self.scanner.skip_ws();
            match self.match_op(LEVELS[level]) {
                Some(op) => {
                    let rhs = self.binary(level + 1)?;
                    lhs = Expr::operation(op, vec![lhs, rhs]);
                }
                None => {
                    self.scanner.reset(save);
                    break;
                }
            }
        }
        Ok(lhs)
    }

    fn match_op(&mut self, ops: &[(&str, &'static str)]) -> Option<&'static str> {
        for (token, name) in ops {
            let matched = if token.starts_with(|c: char| c.is_alphabetic()) {
                self.scanner.eat_keyword(token)
            } else {
                self.scanner.eat(token)
            };
            if matched {
                return Some(name);
            }
        }
        None
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.nested(Self::unary_operand)
    }

    fn unary_operand(&mut self) -> PResult<Expr> {
        self.scanner.skip_ws();
        if self.scanner.eat_keyword("not") {
            let operand = self.unary()?;
            return Ok(Expr::operation("not", vec![operand]));
        }
        for sign in ["-", "+"] {
            if self.scanner.eat(sign) {
                let operand = self.unary()?;
                return Ok(match (sign, operand) {
                    ("-", Expr::Literal(Value::Number(n))) => Expr::literal(-n),
                    (_, Expr::Literal(Value::Number(n))) => Expr::literal(n),
                    (_, operand) => Expr::operation(sign, vec![operand]),
                });
            }
        }
        let atom = self.atom()?;
        self.postfix(atom)
    }

    fn postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            let ch = self.scanner.peek();
            let next = self.scanner.peekahead(1);
            let is_ref = matches!(expr, Expr::Reference(_));
            if !is_ref && ch == '.' && (is_ident_start(next) || next.is_ascii_digit()) {
                self.scanner.bump();
                let key = match self.read_index() {
                    Some(i) => Expr::literal(i as f64),
                    None => match self.scanner.read_ident() {
                        Some(name) => Expr::literal(name),
                        None => return Err(self.fail("expected a property name")),
                    },
                };
                expr = Expr::operation("get", vec![expr, key]);
            } else if !is_ref && ch == '[' {
                self.scanner.bump();
                let key = self.expr()?;
                self.expect("]")?;
                expr = Expr::operation("get", vec![expr, key]);
            } else if ch == '#' && is_ident_start(next) {
                self.scanner.bump();
                let name = match self.scanner.read_ident() {
                    Some(name) => name,
                    None => return Err(self.fail("expected a format name")),
                };
                let mut args = vec![expr, Expr::literal(name)];
                while self.scanner.eat(",") {
                    args.push(self.unary()?);
                }
                expr = Expr::operation("format", args);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn read_index(&mut self) -> Option<i64> {
        let start = self.scanner.pos();
        while self.scanner.peek().is_ascii_digit() {
            self.scanner.bump();
        }
        let digits = self.scanner.slice(start, self.scanner.pos());
        match digits.parse::<i64>() {
            Ok(i) => Some(i),
            Err(_) => {
                self.scanner.reset(start);
                None
            }
        }
    }

    fn atom(&mut self) -> PResult<Expr> {
        self.scanner.skip_ws();
        let ch = self.scanner.peek();
        let next = self.scanner.peekahead(1);
        match ch {
            '0'..='9' => self.number(),
            '.' if next.is_ascii_digit() => self.number(),
            '\'' | '"' | '`' => self.string(),
            ':' if is_ident_char(next) => self.symbol(),
            '#' => self.date_literal(),
            '[' => self.array(),
            '{' => self.object(),
            '(' => self.paren(),
            '=' if next == '>' => {
                self.scanner.eat("=>");
                let body = self.expr()?;
                Ok(Expr::application(body, None))
            }
            '|' => self.application(),
            '^' | '!' | '~' | '*' | '@' => Ok(Expr::reference(self.keypath()?)),
            c if is_ident_start(c) => self.identifier(),
            '\x00' if self.scanner.at_end() => Err(self.fail("unexpected end of input")),
            c => Err(self.fail(format!("unexpected character `{c}`"))),
        }
    }

    fn number(&mut self) -> PResult<Expr> {
        match self.scanner.read_number() {
            Some(n) => Ok(Expr::literal(n)),
            None => Err(self.fail("invalid number")),
        }
    }

    fn symbol(&mut self) -> PResult<Expr> {
        self.scanner.bump();
        let start = self.scanner.pos();
        while is_ident_char(self.scanner.peek()) || self.scanner.peek() == '-' {
            self.scanner.bump();
        }
        Ok(Expr::literal(self.scanner.slice(start, self.scanner.pos())))
    }

    /// Quoted string with escapes and `${expr}` interpolation.
    fn string(&mut self) -> PResult<Expr> {
        let start = self.scanner.pos();
        let quote = self.scanner.bump();
        let mut parts = vec![];
        let mut buf = String::new();
        loop {
            if self.scanner.at_end() {
                return Err(Failure {
                    message: "unterminated string".to_string(),
                    offset: start,
                });
            }
            match self.scanner.bump() {
                c if c == quote => break,
                '\\' => match self.scanner.bump() {
                    'n' => buf.push('\n'),
                    't' => buf.push('\t'),
                    'r' => buf.push('\r'),
                    '0' => buf.push('\0'),
                    'u' => buf.push(self.unicode_escape()?),
                    c => buf.push(c),
                },
                '$' if self.scanner.peek() == '{' => {
                    self.scanner.bump();
                    if !buf.is_empty() {
                        parts.push(Expr::literal(std::mem::take(&mut buf)));
                    }
                    parts.push(self.program()?);
                    self.expect("}")?;
                }
                c => buf.push(c),
            }
        }
        if parts.is_empty() {
            return Ok(Expr::literal(buf));
        }
        if !buf.is_empty() {
            parts.push(Expr::literal(buf));
        }
        Ok(Expr::operation("cat", parts))
    }

    fn unicode_escape(&mut self) -> PResult<char> {
        let start = self.scanner.pos();
        for _ in 0..4 {
            if !self.scanner.peek().is_ascii_hexdigit() {
                return Err(self.fail("invalid unicode escape"));
            }
            self.scanner.bump();
        }
        let hex = self.scanner.slice(start, self.scanner.pos());
        u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.fail("invalid unicode escape"))
    }

    /// `#2024-01-31#`, `#now#` or `#1 day 2h#`.
    fn date_literal(&mut self) -> PResult<Expr> {
        let start = self.scanner.pos();
        self.scanner.bump();
        let rest = self.scanner.rest();
        let end = match rest.find('#') {
            Some(end) => end,
            None => return Err(self.fail("unterminated date literal")),
        };
        let body = rest[..end].trim();
        self.scanner.reset(start + 1 + end + 1);

        if dates::is_relative_keyword(body) {
            return Ok(Expr::operation("date", vec![Expr::literal(body)]));
        }
        if let Some(d) = dates::parse_date(body) {
            return Ok(Expr::literal(d));
        }
        match dates::parse_timespan(body) {
            Ok(t) => Ok(Expr::literal(t)),
            Err(e) => Err(Failure {
                message: format!("invalid date or timespan `{body}`. {e}"),
                offset: start,
            }),
        }
    }

    fn array(&mut self) -> PResult<Expr> {
        self.scanner.bump();
        let mut items = vec![];
        loop {
            self.scanner.skip_ws();
            if self.scanner.eat("]") {
                break;
            }
            if self.scanner.at_end() {
                return Err(self.fail("expected `]`"));
            }
            items.push(self.expr()?);
            self.scanner.skip_ws();
            self.scanner.eat(",");
        }
        if items.iter().all(Expr::is_literal) {
            let values = items
                .into_iter()
                .filter_map(|e| match e {
                    Expr::Literal(v) => Some(v),
                    _ => None,
                })
                .collect::<Vec<_>>();
            return Ok(Expr::literal(values));
        }
        Ok(Expr::operation("array", items))
    }

    fn object(&mut self) -> PResult<Expr> {
        self.scanner.bump();
        let mut pairs = vec![];
        loop {
            self.scanner.skip_ws();
            if self.scanner.eat("}") {
                break;
            }
            let key: Rc<str> = match self.scanner.peek() {
                '\'' | '"' | '`' => match self.string()? {
                    Expr::Literal(Value::String(s)) => s,
                    _ => return Err(self.fail("object keys cannot be interpolated")),
                },
                c if c.is_ascii_digit() => match self.scanner.read_number() {
                    Some(n) => crate::value::format_number(n).into(),
                    None => return Err(self.fail("invalid object key")),
                },
                _ => match self.scanner.read_ident() {
                    Some(name) => name.into(),
                    None => return Err(self.fail("expected an object key")),
                },
            };
            self.expect(":")?;
            let value = self.expr()?;
            pairs.push((key, value));
            self.scanner.skip_ws();
            self.scanner.eat(",");
        }
        Ok(fold_object(pairs).unwrap_or_else(|| Expr::literal(Map::new())))
    }

    /// Parenthesized forms are read at most once per offset, since a failed grouping
    /// is read again as a call.
    fn paren(&mut self) -> PResult<Expr> {
        let start = self.scanner.pos();
        if let Some((result, end)) = self.parens.get(&start).cloned() {
            self.scanner.reset(end);
            return result;
        }
        let result = self.grouping_or_call();
        self.parens
            .insert(start, (result.clone(), self.scanner.pos()));
        result
    }

    /// Either a parenthesized program or an s-expression call. Whichever gets further
    /// reports the error when both fail.
    fn grouping_or_call(&mut self) -> PResult<Expr> {
        let save = self.scanner.pos();
        self.scanner.bump();
        let first = self.program().and_then(|e| {
            self.expect(")")?;
            Ok(e)
        });
        match first {
            Ok(Expr::Reference(path)) if path.is_simple_name() && !path.is_pipe_ref() => {
                // `(name)` is a call with no arguments.
                let name = path.head_name().unwrap_or_default();
                Ok(Expr::operation(name, vec![]))
            }
            Ok(e) => Ok(e),
            Err(grouping_err) if grouping_err.message == TOO_DEEP => Err(grouping_err),
            Err(grouping_err) => {
                self.scanner.reset(save);
                match self.scall() {
                    Ok(e) => Ok(e),
                    Err(call_err) if call_err.offset >= grouping_err.offset => Err(call_err),
                    Err(_) => Err(grouping_err),
                }
            }
        }
    }

    fn scall(&mut self) -> PResult<Expr> {
        self.expect("(")?;
        self.scanner.skip_ws();
        let op = match self.op_name() {
            Some(op) => op,
            None => return Err(self.fail("expected an operator name")),
        };
        let (args, opts) = self.call_args(")")?;
        Ok(Expr::operation_with(op, args, opts))
    }

    fn op_name(&mut self) -> Option<&'source str> {
        if let Some(id) = self.scanner.read_ident() {
            return Some(id);
        }
        let start = self.scanner.pos();
        for sym in OP_SYMBOLS {
            if self.scanner.eat(sym) {
                return Some(self.scanner.slice(start, self.scanner.pos()));
            }
        }
        None
    }

    /// Arguments up to `close`. Commas are optional; `name: value` pairs become options.
    fn call_args(&mut self, close: &str) -> PResult<(Vec<Expr>, Option<Expr>)> {
        let mut args = vec![];
        let mut opts = vec![];
        loop {
            self.scanner.skip_ws();
            if self.scanner.eat(close) {
                break;
            }
            if self.scanner.at_end() {
                return Err(self.fail(format!("expected `{close}`")));
            }
            let save = self.scanner.pos();
            if let Some(name) = self.scanner.read_ident() {
                if self.scanner.peek() == ':' && self.scanner.peekahead(1) != ':' {
                    self.scanner.bump();
                    let value = self.expr()?;
                    opts.push((Rc::from(name), value));
                    self.scanner.skip_ws();
                    self.scanner.eat(",");
                    continue;
                }
                self.scanner.reset(save);
            }
            args.push(self.expr()?);
            self.scanner.skip_ws();
            self.scanner.eat(",");
        }
        Ok((args, fold_object(opts)))
    }

    fn application(&mut self) -> PResult<Expr> {
        self.scanner.bump();
        let mut names: Vec<Rc<str>> = vec![];
        loop {
            self.scanner.skip_ws();
            if self.scanner.eat("|") {
                break;
            }
            match self.scanner.read_ident() {
                Some(name) => names.push(name.into()),
                None => return Err(self.fail("expected a parameter name or `|`")),
            }
            self.scanner.skip_ws();
            self.scanner.eat(",");
        }
        self.expect("=>")?;
        let body = self.expr()?;
        let names = if names.is_empty() { None } else { Some(names) };
        Ok(Expr::application(body, names))
    }

    fn identifier(&mut self) -> PResult<Expr> {
        let save = self.scanner.pos();
        let name = match self.scanner.read_ident() {
            Some(name) => name,
            None => return Err(self.fail("expected an identifier")),
        };
        match name {
            "true" => return Ok(Expr::literal(true)),
            "false" => return Ok(Expr::literal(false)),
            "null" => return Ok(Expr::Literal(Value::Null)),
            "undefined" => return Ok(Expr::Literal(Value::Undefined)),
            // Non-finite numbers print under these names.
            "Infinity" => return Ok(Expr::literal(f64::INFINITY)),
            "NaN" => return Ok(Expr::literal(f64::NAN)),
            "if" if self.scanner.peek().is_whitespace() => return self.if_expr(),
            _ => (),
        }
        if self.scanner.peek() == '(' {
            self.scanner.bump();
            let (args, opts) = self.call_args(")")?;
            return Ok(Expr::operation_with(name, args, opts));
        }
        self.scanner.reset(save);
        Ok(Expr::reference(self.keypath()?))
    }

    /// `if c then a elif c then b else d end`, with `else if` accepted for `elif`.
    fn if_expr(&mut self) -> PResult<Expr> {
        let mut args = vec![];
        loop {
            args.push(self.expr()?);
            self.scanner.skip_ws();
            if !self.scanner.eat_keyword("then") {
                return Err(self.fail("expected `then`"));
            }
            args.push(self.expr()?);
            self.scanner.skip_ws();
            if self.scanner.eat_keyword("elif") {
                continue;
            }
            if self.scanner.eat_keyword("else") {
                self.scanner.skip_ws();
                if self.scanner.eat_keyword("if") {
                    continue;
                }
                args.push(self.expr()?);
                self.scanner.skip_ws();
            }
            break;
        }
        self.scanner.eat_keyword("end");
        Ok(Expr::operation("if", args))
    }

    /// `^^!name.0[expr]['key']` style reference paths.
    pub(crate) fn keypath(&mut self) -> PResult<Keypath> {
        let mut path = Keypath::default();
        while self.scanner.eat("^") {
            path.up += 1;
        }
        if path.up > 0 && self.scanner.peek() == '.' && is_ident_start(self.scanner.peekahead(1))
        {
            self.scanner.bump();
        }
        if let Some(prefix) = Prefix::from_char(self.scanner.peek()) {
            self.scanner.bump();
            path.prefix = Some(prefix);
            if self.scanner.peek() == '.' && is_ident_start(self.scanner.peekahead(1)) {
                self.scanner.bump();
            }
        }

        let anchored = path.up > 0 || path.prefix.is_some();
        match self.scanner.peek() {
            c if is_ident_start(c) => {
                if let Some(name) = self.scanner.read_ident() {
                    path.keys.push(Key::Name(name.into()));
                }
            }
            '[' if anchored => path.keys.push(self.bracket_key()?),
            _ if anchored => return Ok(path),
            _ => return Err(self.fail("expected a reference")),
        }

        loop {
            let ch = self.scanner.peek();
            let next = self.scanner.peekahead(1);
            if ch == '.' && is_ident_start(next) {
                self.scanner.bump();
                if let Some(name) = self.scanner.read_ident() {
                    path.keys.push(Key::Name(name.into()));
                }
            } else if ch == '.' && next.is_ascii_digit() {
                self.scanner.bump();
                match self.read_index() {
                    Some(i) => path.keys.push(Key::Index(i)),
                    None => return Err(self.fail("invalid index")),
                }
            } else if ch == '[' {
                path.keys.push(self.bracket_key()?);
            } else {
                break;
            }
        }
        Ok(path)
    }

    fn bracket_key(&mut self) -> PResult<Key> {
        self.scanner.bump();
        let key = self.expr()?;
        self.expect("]")?;
        Ok(match key {
            Expr::Literal(Value::Number(n)) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Key::Index(n as i64)
            }
            Expr::Literal(Value::String(s)) => Key::Name(s),
            key => Key::Expr(key),
        })
    }
}

/// Key/value pairs as an object expression, constant-folded when every value is literal.
fn fold_object(pairs: Vec<(Rc<str>, Expr)>) -> Option<Expr> {
    if pairs.is_empty() {
        return None;
    }
    if pairs.iter().all(|(_, v)| v.is_literal()) {
        let mut map = Map::new();
        for (k, v) in pairs {
            if let Expr::Literal(v) = v {
                map.insert(k, v);
            }
        }
        return Some(Expr::literal(map));
    }
    let mut args = vec![];
    for (k, v) in pairs {
        args.push(Expr::Literal(Value::String(k)));
        args.push(v);
    }
    Some(Expr::operation("object", args))
}

pub(crate) fn finish(file: &str, text: &str, result: PResult<Expr>) -> Result<Expr, ParseError> {
    result.map_err(|f| ParseError::new(file, text, f.message, f.offset))
}

/// Parse an expression program, requiring the whole input to be consumed.
pub fn parse(text: &str) -> Result<Expr, ParseError> {
    parse_with(text, &ParseOptions::default())
}

pub fn parse_with(text: &str, options: &ParseOptions) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(text);
    let result = parser.program().and_then(|e| {
        parser.scanner.skip_ws();
        if options.consume_all && !parser.scanner.at_end() {
            Err(parser.fail(format!(
                "unexpected `{}`",
                parser.scanner.rest().chars().take(16).collect::<String>()
            )))
        } else {
            Ok(e)
        }
    });
    finish("<expr>", text, result)
}

/// Parse a reference path such as `^foo.bar[0]`.
pub fn parse_path(text: &str) -> Result<Keypath, ParseError> {
    let mut parser = Parser::new(text);
    parser.scanner.skip_ws();
    let result = parser.keypath().and_then(|k| {
        parser.scanner.skip_ws();
        if parser.scanner.at_end() {
            Ok(k)
        } else {
            Err(parser.fail("unexpected input after path"))
        }
    });
    result.map_err(|f| ParseError::new("<path>", text, f.message, f.offset))
}

/// A source language that can be evaluated from text. Parsed results are cached per
/// root context under the parser's namespace.
pub trait SourceParser {
    fn namespace(&self) -> &str;
    fn parse(&self, text: &str) -> Result<Expr, ParseError>;
}

/// The expression language itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionParser;

impl SourceParser for ExpressionParser {
    fn namespace(&self) -> &str {
        "default"
    }

    fn parse(&self, text: &str) -> Result<Expr, ParseError> {
        parse(text)
    }
}
