//! Interpolating engine with `<%= expr %>` tags.
//!
//! # Syntax
//!
//! - `<%= name %>` - Variable output
//! - `<%- name %>` - Variable output, HTML-escaped
//! - `<%= user.name %>` / `<%= items.0 %>` - Nested property and index access
//! - `<%= upper(name) %>` - Helper call; arguments may be variables,
//!   literals (`'text'`, `"text"`, `42`, `true`, `null`) or other helper calls
//!
//! Referencing a variable or helper that does not exist is an error naming
//! it, e.g. `name is not defined`. A defined variable whose nested path is
//! missing renders as an empty string.
//!
//! # Example
//!
//! ```rust
//! use engine_cache::{defaults, EngineRegistry, Locals};
//!
//! let mut registry = EngineRegistry::new();
//! registry.register("tmpl", defaults::base())?;
//!
//! let engine = registry.get("tmpl").unwrap();
//! let locals = Locals::new().with("name", "Ada");
//! assert_eq!(engine.render_sync("Hi <%= name %>", locals)?, "Hi Ada");
//! # Ok::<(), engine_cache::RenderError>(())
//! ```

use engine_cache_helpers::{value_to_string, HelperFn};
use serde_json::{Number, Value};

use crate::definition::{Compiled, EngineSpec};
use crate::error::{RenderError, Result};
use crate::locals::Locals;

const OPEN: &str = "<%";
const CLOSE: &str = "%>";

/// The `<%= %>` engine: `render_sync` plus a `compile` that parses once.
pub fn base() -> EngineSpec {
    EngineSpec::new()
        .name("base")
        .render_sync(base_render)
        .compile(base_compile)
}

fn base_render(src: &str, locals: &Locals) -> Result<String> {
    render_segments(&parse(src)?, locals)
}

fn base_compile(src: &str, _locals: &Locals) -> Result<Compiled> {
    let segments = parse(src)?;
    Ok(Compiled::template(move |locals| {
        render_segments(&segments, locals)
    }))
}

#[derive(Clone, Debug, PartialEq)]
enum Segment {
    Text(String),
    Output { expr: Expr, escape: bool },
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Path(String),
    Literal(Value),
    Call { name: String, args: Vec<Expr> },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    LParen,
    RParen,
    Comma,
}

fn syntax_error(message: impl Into<String>) -> RenderError {
    RenderError::engine(message.into())
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        let offset = template.len() - rest.len() + start;
        let tag = &rest[start + OPEN.len()..];

        let (escape, body) = if let Some(body) = tag.strip_prefix('=') {
            (false, body)
        } else if let Some(body) = tag.strip_prefix('-') {
            (true, body)
        } else {
            return Err(syntax_error(format!(
                "unsupported tag at offset {}: expected \"<%=\" or \"<%-\"",
                offset
            )));
        };

        let end = body
            .find(CLOSE)
            .ok_or_else(|| syntax_error(format!("unclosed tag at offset {}", offset)))?;
        let expr = Parser::new(tokenize(&body[..end])?).parse()?;
        segments.push(Segment::Output { expr, escape });
        rest = &body[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    if c == ch {
                        closed = true;
                        break;
                    }
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                        continue;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(syntax_error("unterminated string literal"));
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || matches!(c, '-' | '.' | 'e' | 'E' | '+') {
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = serde_json::from_str::<Number>(&text)
                    .map_err(|_| syntax_error(format!("invalid number \"{}\"", text)))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || matches!(c, '_' | '$' | '.') {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(syntax_error(format!(
                    "unexpected character '{}' in expression",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(syntax_error(format!("unexpected {:?} after expression", token))),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Num(number)) => Ok(Expr::Literal(Value::Number(number))),
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let args = self.args()?;
                    Ok(Expr::Call { name: ident, args })
                }
                _ => Ok(Expr::Path(ident)),
            },
            Some(token) => Err(syntax_error(format!("unexpected {:?} in expression", token))),
            None => Err(syntax_error("expected an expression")),
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err(syntax_error("expected \",\" or \")\" in helper call")),
            }
        }
    }
}

fn eval(expr: &Expr, locals: &Locals) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => {
            let root = path.split('.').next().unwrap_or(path);
            if !locals.data.contains_key(root) {
                return Err(RenderError::engine(format!("{} is not defined", root)));
            }
            Ok(locals.lookup(path).cloned().unwrap_or(Value::Null))
        }
        Expr::Call { name, args } => {
            let helper = match locals.helpers.get_helper(name) {
                Some(HelperFn::Sync(helper)) => helper,
                _ => return Err(RenderError::engine(format!("{} is not defined", name))),
            };
            let args = args
                .iter()
                .map(|arg| eval(arg, locals))
                .collect::<Result<Vec<_>>>()?;
            helper.call(&args).map_err(RenderError::engine)
        }
    }
}

fn render_segments(segments: &[Segment], locals: &Locals) -> Result<String> {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Output { expr, escape } => {
                let value = value_to_string(&eval(expr, locals)?);
                if *escape {
                    out.push_str(&escape_html(&value));
                } else {
                    out.push_str(&value);
                }
            }
        }
    }
    Ok(out)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
