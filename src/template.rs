// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mustache-style templates. Blocks desugar into the same operations the
//! expression language uses, so templates need no evaluator of their own.

use crate::ast::Expr;
use crate::parser::{
    self, Failure, PResult, ParseError, Parser, SourceParser, MAX_NESTING, TOO_DEEP,
};
use crate::value::Value;

enum Stop {
    End,
    Else,
    ElseIf(Expr),
    When(Expr),
    Close(Option<String>),
}

struct TemplateReader<'source> {
    parser: Parser<'source>,
    depth: usize,
}

impl<'source> TemplateReader<'source> {
    fn new(text: &'source str) -> Self {
        Self {
            parser: Parser::new(text),
            depth: 0,
        }
    }

    fn close_tag(&mut self) -> PResult<()> {
        self.parser.expect("}}")
    }

    /// Text and tags up to the next block continuation or the end of input.
    fn parts(&mut self) -> PResult<(Vec<Expr>, Stop)> {
        let mut parts = vec![];
        let mut text = String::new();
        let stop = loop {
            let scanner = &mut self.parser.scanner;
            if scanner.at_end() {
                break Stop::End;
            }
            if scanner.eat("\\{{") {
                text.push_str("{{");
                continue;
            }
            if !scanner.starts_with("{{") {
                text.push(scanner.bump());
                continue;
            }

            let tag_start = scanner.pos();
            scanner.eat("{{");
            if !text.is_empty() {
                parts.push(Expr::literal(std::mem::take(&mut text)));
            }
            if let Some(stop) = self.tag(tag_start, &mut parts)? {
                break stop;
            }
        };
        if !text.is_empty() {
            parts.push(Expr::literal(text));
        }
        Ok((parts, stop))
    }

    /// Reads one tag after its opening braces. Block continuations are returned as a stop.
    fn tag(&mut self, tag_start: usize, parts: &mut Vec<Expr>) -> PResult<Option<Stop>> {
        let scanner = &mut self.parser.scanner;
        scanner.skip_ws();

        if scanner.eat("!") {
            match scanner.rest().find("}}") {
                Some(end) => scanner.reset(scanner.pos() + end + 2),
                None => return Err(failure(tag_start, "unterminated comment")),
            }
            return Ok(None);
        }

        if scanner.starts_with("/") {
            scanner.bump();
            scanner.skip_ws();
            let name = scanner.read_ident().map(str::to_string);
            self.close_tag()?;
            return Ok(Some(Stop::Close(name)));
        }

        if scanner.starts_with("#") {
            let save = scanner.pos();
            scanner.bump();
            if let Some(kind) = scanner.read_ident() {
                if matches!(kind, "each" | "with" | "if" | "unless" | "case") {
                    parts.push(self.block(kind, tag_start)?);
                    return Ok(None);
                }
            }
            self.parser.scanner.reset(save);
        }

        let scanner = &mut self.parser.scanner;
        if scanner.eat_keyword("else") {
            scanner.skip_ws();
            if scanner.eat_keyword("if") {
                let cond = self.parser.program()?;
                self.close_tag()?;
                return Ok(Some(Stop::ElseIf(cond)));
            }
            self.close_tag()?;
            return Ok(Some(Stop::Else));
        }
        if scanner.eat_keyword("elif") {
            let cond = self.parser.program()?;
            self.close_tag()?;
            return Ok(Some(Stop::ElseIf(cond)));
        }
        if scanner.eat_keyword("when") {
            let value = self.parser.program()?;
            self.close_tag()?;
            return Ok(Some(Stop::When(value)));
        }

        let expr = self.parser.program()?;
        self.close_tag()?;
        parts.push(expr);
        Ok(None)
    }

    fn block(&mut self, kind: &str, tag_start: usize) -> PResult<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(failure(tag_start, TOO_DEEP));
        }
        self.depth += 1;
        let block = self.block_body(kind, tag_start);
        self.depth -= 1;
        block
    }

    fn block_body(&mut self, kind: &str, tag_start: usize) -> PResult<Expr> {
        let subject = self.parser.program()?;
        self.close_tag()?;

        let mut args = vec![subject];
        let (body, mut stop) = self.parts()?;
        match kind {
            "case" => {
                // Anything before the first `when` is ignored.
                loop {
                    match stop {
                        Stop::When(value) => {
                            let (body, next) = self.parts()?;
                            args.push(value);
                            args.push(concat(body));
                            stop = next;
                        }
                        Stop::Else => {
                            let (body, next) = self.parts()?;
                            args.push(concat(body));
                            stop = next;
                            break;
                        }
                        _ => break,
                    }
                }
            }
            "each" | "with" => {
                args.push(Expr::application(concat(body), None));
                if let Stop::Else = stop {
                    let (body, next) = self.parts()?;
                    args.push(concat(body));
                    stop = next;
                }
            }
            _ => {
                args.push(concat(body));
                loop {
                    match stop {
                        Stop::ElseIf(cond) if kind == "if" => {
                            let (body, next) = self.parts()?;
                            args.push(cond);
                            args.push(concat(body));
                            stop = next;
                        }
                        Stop::Else => {
                            let (body, next) = self.parts()?;
                            args.push(concat(body));
                            stop = next;
                            break;
                        }
                        _ => break,
                    }
                }
            }
        }

        match stop {
            Stop::Close(None) => (),
            Stop::Close(Some(name)) if name == kind => (),
            Stop::Close(Some(name)) => {
                return Err(failure(
                    self.parser.scanner.pos(),
                    format!("`{{{{/{name}}}}}` does not close `{kind}`"),
                ))
            }
            Stop::End => return Err(failure(tag_start, format!("unclosed `{kind}` block"))),
            _ => {
                return Err(failure(
                    self.parser.scanner.pos(),
                    format!("unexpected tag in `{kind}` block"),
                ))
            }
        }
        Ok(Expr::operation(kind, args))
    }
}

fn failure(offset: usize, message: impl Into<String>) -> Failure {
    Failure {
        message: message.into(),
        offset,
    }
}

/// Join template parts, keeping plain text as a literal.
fn concat(mut parts: Vec<Expr>) -> Expr {
    if parts.iter().all(Expr::is_literal) {
        let text = parts
            .iter()
            .filter_map(Expr::as_literal)
            .map(Value::to_text)
            .collect::<String>();
        return Expr::literal(text);
    }
    if parts.len() == 1 {
        if let Some(Expr::Operation(op)) = parts.first() {
            if op.op.as_ref() == "cat" {
                return parts.remove(0);
            }
        }
    }
    Expr::operation("cat", parts)
}

pub fn parse_template(text: &str) -> Result<Expr, ParseError> {
    let mut reader = TemplateReader::new(text);
    let result = reader.parts().and_then(|(parts, stop)| match stop {
        Stop::End => Ok(concat(parts)),
        _ => Err(failure(reader.parser.scanner.pos(), "unexpected block tag")),
    });
    parser::finish("<template>", text, result)
}

/// Parses sources as templates. Cached under the `template` namespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateParser;

impl SourceParser for TemplateParser {
    fn namespace(&self) -> &str {
        "template"
    }

    fn parse(&self, text: &str) -> Result<Expr, ParseError> {
        parse_template(text)
    }
}
