//! Component template rendering
//!
//! Components are rendered through the [`TemplateEngine`] trait. The stock
//! [`BraceEngine`] understands a small brace syntax:
//!
//! - `{{ user.name }}` inserts a value, HTML-escaped
//! - `{{@ body }}` inserts a value as-is
//! - `{{if expr}} ... {{else if expr}} ... {{else}} ... {{/if}}` where `expr`
//!   is `path`, `!path`, `path == 'literal'` or `path != 'literal'`
//! - `{{each list}} ... {{/each}}` iterates arrays and objects; the item is
//!   `$value` and its position or key `$index`, unless named with
//!   `{{each list item i}}`
//!
//! Missing values render as empty strings and are falsy. Any other tag is an
//! error rather than empty output.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("unclosed {0} block on '{1}'")]
    Unclosed(&'static str, String),

    #[error("'{0}' without a matching block")]
    Unmatched(String),

    #[error("invalid expression '{0}'")]
    InvalidExpression(String),

    #[error("unsupported tag '{0}'")]
    UnsupportedTag(String),
}

/// Renders a component template against its data
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> Result<String, TemplateError>;
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Truthy(String),
    Falsy(String),
    Equal(String, String),
    NotEqual(String, String),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Value {
        path: String,
        escape: bool,
    },
    If {
        branches: Vec<(Condition, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    Each {
        path: String,
        value: String,
        index: String,
        body: Vec<Node>,
    },
}

/// The default brace-syntax engine
#[derive(Debug, Default, Clone)]
pub struct BraceEngine;

impl BraceEngine {
    pub fn new() -> Self {
        BraceEngine
    }
}

impl TemplateEngine for BraceEngine {
    fn render(&self, template: &str, data: &Value) -> Result<String, TemplateError> {
        let nodes = parse(template)?;
        let mut out = String::with_capacity(template.len());
        let scope = Scope {
            data,
            locals: Vec::new(),
        };
        render_nodes(&nodes, &scope, &mut out);
        Ok(out)
    }
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("valid tag regex"))
}

fn path_regex() -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    PATH.get_or_init(|| {
        Regex::new(r"^(?:this|\.|[A-Za-z_$][\w$]*(?:\.[\w$]+)*)$").expect("valid path regex")
    })
}

/// A block still collecting its children
enum OpenBlock {
    If {
        source: String,
        branches: Vec<(Condition, Vec<Node>)>,
        // `None` once the `else` branch is reached
        current: Option<Condition>,
        body: Vec<Node>,
    },
    Each {
        source: String,
        path: String,
        value: String,
        index: String,
        body: Vec<Node>,
    },
}

impl OpenBlock {
    fn body_mut(&mut self) -> &mut Vec<Node> {
        match self {
            OpenBlock::If { body, .. } | OpenBlock::Each { body, .. } => body,
        }
    }
}

fn push(root: &mut Vec<Node>, stack: &mut [OpenBlock], node: Node) {
    match stack.last_mut() {
        Some(block) => block.body_mut().push(node),
        None => root.push(node),
    }
}

fn parse(template: &str) -> Result<Vec<Node>, TemplateError> {
    let mut root = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut last = 0;

    for caps in tag_regex().captures_iter(template) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

        if whole.start > last {
            push(
                &mut root,
                &mut stack,
                Node::Text(template[last..whole.start].to_string()),
            );
        }
        last = whole.end;

        let (keyword, rest) = match inner.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (inner, ""),
        };

        match keyword {
            "if" => stack.push(OpenBlock::If {
                source: rest.to_string(),
                branches: Vec::new(),
                current: Some(parse_condition(rest)?),
                body: Vec::new(),
            }),
            "else" => {
                let next = match rest.strip_prefix("if") {
                    Some(expr) if expr.starts_with(char::is_whitespace) => {
                        Some(parse_condition(expr.trim())?)
                    }
                    _ if rest.is_empty() => None,
                    _ => return Err(TemplateError::UnsupportedTag(inner.to_string())),
                };
                match stack.last_mut() {
                    Some(OpenBlock::If {
                        branches,
                        current,
                        body,
                        ..
                    }) if current.is_some() => {
                        if let Some(condition) = current.take() {
                            branches.push((condition, std::mem::take(body)));
                        }
                        *current = next;
                    }
                    _ => return Err(TemplateError::Unmatched(inner.to_string())),
                }
            }
            "each" => {
                let mut words = rest.split_whitespace().filter(|w| *w != "as");
                let path = words.next().unwrap_or_default();
                let value = words.next().unwrap_or("$value");
                let index = words.next().unwrap_or("$index");
                let names_valid = [value, index]
                    .iter()
                    .all(|name| path_regex().is_match(name) && !name.contains('.'));
                if !path_regex().is_match(path) || !names_valid || words.next().is_some() {
                    return Err(TemplateError::InvalidExpression(rest.to_string()));
                }
                stack.push(OpenBlock::Each {
                    source: rest.to_string(),
                    path: path.to_string(),
                    value: value.to_string(),
                    index: index.to_string(),
                    body: Vec::new(),
                });
            }
            "/if" => match stack.pop() {
                Some(OpenBlock::If {
                    mut branches,
                    current,
                    body,
                    ..
                }) => {
                    let otherwise = match current {
                        Some(condition) => {
                            branches.push((condition, body));
                            Vec::new()
                        }
                        None => body,
                    };
                    push(&mut root, &mut stack, Node::If { branches, otherwise });
                }
                _ => return Err(TemplateError::Unmatched(inner.to_string())),
            },
            "/each" => match stack.pop() {
                Some(OpenBlock::Each {
                    path,
                    value,
                    index,
                    body,
                    ..
                }) => push(
                    &mut root,
                    &mut stack,
                    Node::Each {
                        path,
                        value,
                        index,
                        body,
                    },
                ),
                _ => return Err(TemplateError::Unmatched(inner.to_string())),
            },
            _ => {
                let (path, escape) = match inner.strip_prefix('@') {
                    Some(path) => (path.trim(), false),
                    None => (inner, true),
                };
                if !path_regex().is_match(path) {
                    return Err(TemplateError::UnsupportedTag(inner.to_string()));
                }
                push(
                    &mut root,
                    &mut stack,
                    Node::Value {
                        path: path.to_string(),
                        escape,
                    },
                );
            }
        }
    }

    match stack.pop() {
        Some(OpenBlock::If { source, .. }) => return Err(TemplateError::Unclosed("if", source)),
        Some(OpenBlock::Each { source, .. }) => {
            return Err(TemplateError::Unclosed("each", source))
        }
        None => {}
    }
    if last < template.len() {
        root.push(Node::Text(template[last..].to_string()));
    }
    Ok(root)
}

fn parse_condition(expr: &str) -> Result<Condition, TemplateError> {
    let invalid = || TemplateError::InvalidExpression(expr.to_string());
    let path = |raw: &str| {
        let raw = raw.trim();
        if path_regex().is_match(raw) {
            Ok(raw.to_string())
        } else {
            Err(invalid())
        }
    };

    for (op, negate) in [("!=", true), ("==", false)] {
        if let Some((left, right)) = expr.split_once(op) {
            let left = path(left)?;
            let literal = parse_literal(right.trim()).ok_or_else(invalid)?;
            return Ok(if negate {
                Condition::NotEqual(left, literal)
            } else {
                Condition::Equal(left, literal)
            });
        }
    }

    match expr.strip_prefix('!') {
        Some(negated) => Ok(Condition::Falsy(path(negated)?)),
        None => Ok(Condition::Truthy(path(expr)?)),
    }
}

/// `'text'`, `"text"` or a bare word (numbers, true/false)
fn parse_literal(raw: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        if let Some(inner) = raw.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return Some(inner.to_string());
        }
    }
    if raw.is_empty() || raw.contains(char::is_whitespace) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Render-time bindings: the component data plus `each` loop variables
struct Scope<'a> {
    data: &'a Value,
    locals: Vec<(String, Value)>,
}

impl Scope<'_> {
    /// Look up a dotted path; `this` or `.` is the data itself
    fn lookup(&self, path: &str) -> Option<&Value> {
        if path == "this" || path == "." {
            return Some(self.data);
        }
        let mut segments = path.split('.');
        let first = segments.next()?;
        let start = match self.locals.iter().rev().find(|(name, _)| name == first) {
            Some((_, value)) => value,
            None => walk(self.data, first)?,
        };
        segments.try_fold(start, walk)
    }
}

fn walk<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn to_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn escape_html(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

fn holds(condition: &Condition, scope: &Scope) -> bool {
    match condition {
        Condition::Truthy(path) => truthy(scope.lookup(path)),
        Condition::Falsy(path) => !truthy(scope.lookup(path)),
        Condition::Equal(path, lit) => scope.lookup(path).is_some_and(|v| to_text(Some(v)) == *lit),
        Condition::NotEqual(path, lit) => {
            !scope.lookup(path).is_some_and(|v| to_text(Some(v)) == *lit)
        }
    }
}

fn render_nodes(nodes: &[Node], scope: &Scope, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Value { path, escape: true } => escape_html(&to_text(scope.lookup(path)), out),
            Node::Value { path, escape: false } => out.push_str(&to_text(scope.lookup(path))),
            Node::If {
                branches,
                otherwise,
            } => {
                let branch = branches
                    .iter()
                    .find(|(condition, _)| holds(condition, scope))
                    .map(|(_, body)| body)
                    .unwrap_or(otherwise);
                render_nodes(branch, scope, out);
            }
            Node::Each {
                path,
                value,
                index,
                body,
            } => {
                let items: Vec<(Value, Value)> = match scope.lookup(path) {
                    Some(Value::Array(items)) => items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| (Value::from(i), item.clone()))
                        .collect(),
                    Some(Value::Object(map)) => map
                        .iter()
                        .map(|(key, item)| (Value::from(key.as_str()), item.clone()))
                        .collect(),
                    _ => Vec::new(),
                };
                for (position, item) in items {
                    let mut locals = scope.locals.clone();
                    locals.push((index.clone(), position));
                    locals.push((value.clone(), item));
                    let inner = Scope {
                        data: scope.data,
                        locals,
                    };
                    render_nodes(body, &inner, out);
                }
            }
        }
    }
}
