//! Template parsing.
//!
//! Templates are literal text interleaved with `{{ ... }}` actions. An
//! action is a pipeline of commands separated by `|`; each command is either
//! a single operand or a function name followed by operands. The value of
//! the previous command is passed as the final argument of the next one:
//!
//! ```text
//! {{ param "name" }}
//! {{ lookup "file.owner.etc.uid" }}
//! {{ param "hosts" | split "," | join ";" }}
//! {{- trim (param "padded") -}}
//! ```

use crate::error::{RenderError, Result};
use serde_json::Value;

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub(crate) nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    pub(crate) commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub(crate) args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    Literal(Value),
    Ident(String),
    Pipeline(Pipeline),
}

impl Template {
    /// Parse `source`, attributing any syntax error to `location`.
    pub fn parse(location: &str, source: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut pos = 0;
        let mut trim_next = false;

        loop {
            let rest = &source[pos..];
            let Some(open) = rest.find("{{") else {
                push_text(&mut nodes, rest, trim_next, false);
                break;
            };

            let after = pos + open + 2;
            let trim_left = is_trim_marker(&source[after..]);
            push_text(&mut nodes, &rest[..open], trim_next, trim_left);

            let body = if trim_left { after + 1 } else { after };
            let mut parser = Parser::new(location, source, body);
            let (pipeline, trim_right) = parser.parse_action()?;
            if let Some(pipeline) = pipeline {
                nodes.push(Node::Action(pipeline));
            }

            trim_next = trim_right;
            pos = parser.lexer.pos;
        }

        Ok(Self { nodes })
    }

    /// Every `param "X"` reference in the template, as `param.X`.
    ///
    /// Nothing is evaluated: only literal parameter names are collected, in
    /// first-seen order without duplicates.
    pub fn param_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        for node in &self.nodes {
            if let Node::Action(pipeline) = node {
                collect_params(pipeline, &mut refs);
            }
        }
        refs
    }
}

fn collect_params(pipeline: &Pipeline, refs: &mut Vec<String>) {
    let mut previous_literal: Option<&str> = None;

    for command in &pipeline.commands {
        match command.args.as_slice() {
            [Arg::Ident(name), Arg::Literal(Value::String(param)), ..] if name == "param" => {
                push_unique(refs, format!("param.{param}"));
            }
            // `{{ "name" | param }}`
            [Arg::Ident(name)] if name == "param" => {
                if let Some(param) = previous_literal {
                    push_unique(refs, format!("param.{param}"));
                }
            }
            _ => {}
        }

        for arg in &command.args {
            if let Arg::Pipeline(inner) = arg {
                collect_params(inner, refs);
            }
        }

        previous_literal = match command.args.as_slice() {
            [Arg::Literal(Value::String(s))] => Some(s.as_str()),
            _ => None,
        };
    }
}

fn push_unique(refs: &mut Vec<String>, reference: String) {
    if !refs.contains(&reference) {
        refs.push(reference);
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// `-` followed by whitespace right after `{{` or right before `}}`.
fn is_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Ident(String),
    Pipe,
    LParen,
    RParen,
    End { trim: bool },
}

struct Lexer<'a> {
    location: &'a str,
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn error(&self, offset: usize, message: impl Into<String>) -> RenderError {
        RenderError::Syntax {
            location: self.location.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Skip a `/* ... */` comment, returning whether one was present.
    fn skip_comment(&mut self) -> Result<bool> {
        self.skip_whitespace();
        if !self.rest().starts_with("/*") {
            return Ok(false);
        }
        let start = self.pos;
        match self.rest().find("*/") {
            Some(end) => {
                self.pos += end + 2;
                Ok(true)
            }
            None => Err(self.error(start, "unclosed comment")),
        }
    }

    fn next_token(&mut self) -> Result<(usize, Token)> {
        let had_space = self.pos > 0
            && self.src[..self.pos]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
        let before = self.pos;
        self.skip_whitespace();
        let start = self.pos;
        let rest = self.rest();

        if rest.starts_with("-}}") && (had_space || start > before) {
            self.pos += 3;
            return Ok((start, Token::End { trim: true }));
        }
        if rest.starts_with("}}") {
            self.pos += 2;
            return Ok((start, Token::End { trim: false }));
        }

        let Some(c) = rest.chars().next() else {
            return Err(self.error(start, "unclosed action"));
        };

        match c {
            '|' => {
                self.pos += 1;
                Ok((start, Token::Pipe))
            }
            '(' => {
                self.pos += 1;
                Ok((start, Token::LParen))
            }
            ')' => {
                self.pos += 1;
                Ok((start, Token::RParen))
            }
            '"' => self.quoted(start),
            '`' => {
                let body = &rest[1..];
                match body.find('`') {
                    Some(end) => {
                        self.pos += end + 2;
                        Ok((start, Token::Literal(Value::String(body[..end].to_string()))))
                    }
                    None => Err(self.error(start, "unterminated raw string")),
                }
            }
            c if c.is_ascii_digit() || ((c == '-' || c == '+') && starts_digit(&rest[1..])) => {
                self.number(start)
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = rest
                    .find(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                    .unwrap_or(rest.len());
                let word = &rest[..len];
                self.pos += len;
                let token = match word {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "nil" => Token::Literal(Value::Null),
                    _ => Token::Ident(word.to_string()),
                };
                Ok((start, token))
            }
            other => Err(self.error(start, format!("unexpected {other:?} in action"))),
        }
    }

    fn quoted(&mut self, start: usize) -> Result<(usize, Token)> {
        let mut out = String::new();
        let mut chars = self.rest().char_indices().skip(1);

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok((start, Token::Literal(Value::String(out))));
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, other)) => {
                        return Err(self.error(start, format!("unknown escape sequence \\{other}")));
                    }
                    None => break,
                },
                '\n' => break,
                c => out.push(c),
            }
        }

        Err(self.error(start, "unterminated quoted string"))
    }

    fn number(&mut self, start: usize) -> Result<(usize, Token)> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .skip(1)
            .find(|&(_, c)| !(c.is_ascii_digit() || c == '.' || c == '_'))
            .map_or(rest.len(), |(i, _)| i);
        let text = rest[..len].replace('_', "");
        self.pos += len;

        if let Ok(n) = text.parse::<i64>() {
            return Ok((start, Token::Literal(Value::from(n))));
        }
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(|n| (start, Token::Literal(Value::Number(n))))
            .ok_or_else(|| self.error(start, format!("bad number syntax: {text:?}")))
    }
}

fn starts_digit(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<(usize, Token)>,
}

impl<'a> Parser<'a> {
    fn new(location: &'a str, src: &'a str, pos: usize) -> Self {
        Self {
            lexer: Lexer { location, src, pos },
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        match &self.peeked {
            Some((_, token)) => Ok(token),
            None => Err(self.lexer.error(self.lexer.pos, "unexpected end of action")),
        }
    }

    fn next(&mut self) -> Result<(usize, Token)> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token(),
        }
    }

    /// Parse one action body through its closing `}}`.
    ///
    /// Returns `None` for comment-only actions, plus whether the closing
    /// delimiter asked for trailing whitespace to be trimmed.
    fn parse_action(&mut self) -> Result<(Option<Pipeline>, bool)> {
        let comment = self.lexer.skip_comment()?;

        if let Token::End { trim } = *self.peek()? {
            let (offset, _) = self.next()?;
            if comment {
                return Ok((None, trim));
            }
            return Err(self.lexer.error(offset, "missing value for command"));
        }

        let pipeline = self.parse_pipeline()?;
        match self.next()? {
            (_, Token::End { trim }) => Ok((Some(pipeline), trim)),
            (offset, token) => Err(self
                .lexer
                .error(offset, format!("unexpected {token:?} in action"))),
        }
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline> {
        let mut commands = vec![self.parse_command()?];
        while matches!(self.peek()?, Token::Pipe) {
            self.next()?;
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline { commands })
    }

    fn parse_command(&mut self) -> Result<Command> {
        let mut args = Vec::new();
        while matches!(
            self.peek()?,
            Token::Literal(_) | Token::Ident(_) | Token::LParen
        ) {
            args.push(self.parse_operand()?);
        }

        if args.is_empty() {
            let offset = self.peeked.as_ref().map_or(self.lexer.pos, |(o, _)| *o);
            return Err(self.lexer.error(offset, "missing value for command"));
        }
        Ok(Command { args })
    }

    fn parse_operand(&mut self) -> Result<Arg> {
        match self.next()? {
            (_, Token::Literal(value)) => Ok(Arg::Literal(value)),
            (_, Token::Ident(name)) => Ok(Arg::Ident(name)),
            (_, Token::LParen) => {
                let inner = self.parse_pipeline()?;
                match self.next()? {
                    (_, Token::RParen) => Ok(Arg::Pipeline(inner)),
                    (offset, _) => Err(self.lexer.error(offset, "unclosed left paren")),
                }
            }
            (offset, token) => Err(self
                .lexer
                .error(offset, format!("unexpected {token:?} in operand"))),
        }
    }
}
