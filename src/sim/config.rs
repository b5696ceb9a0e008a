//! Declarative configuration text understood by the simulated cloud
//!
//! Accepts `resource "TYPE" "NAME" { key = value ... }` blocks where values
//! are quoted strings, integers or booleans. `#` starts a comment.

use std::collections::BTreeMap;

use crate::acc::Value;
use crate::common::{Error, Result};

/// One `resource` block
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBlock {
    pub rtype: String,
    pub name: String,
    pub attrs: BTreeMap<String, Value>,
}

impl ResourceBlock {
    /// Address used to refer to this resource, `TYPE.NAME`
    pub fn address(&self) -> String {
        format!("{}.{}", self.rtype, self.name)
    }

    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }

    pub fn bool_attr(&self, key: &str) -> Option<bool> {
        match self.attrs.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ResourceConfig(message.into())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Open,
    Close,
    Equals,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '{' => {
                chars.next();
                tokens.push(Token::Open);
            }
            '}' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some(other) => s.push(other),
                            None => return Err(invalid("unterminated string")),
                        },
                        Some(other) => s.push(other),
                        None => return Err(invalid("unterminated string")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            c if c.is_alphanumeric() || c == '_' || c == '-' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => return Err(invalid(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

/// Parse configuration text into resource blocks
pub fn parse(input: &str) -> Result<Vec<ResourceBlock>> {
    let tokens = tokenize(input)?;
    let mut iter = tokens.into_iter();
    let mut blocks: Vec<ResourceBlock> = Vec::new();

    while let Some(token) = iter.next() {
        match token {
            Token::Word(w) if w == "resource" => {}
            other => return Err(invalid(format!("expected 'resource', got {:?}", other))),
        }

        let rtype = match iter.next() {
            Some(Token::Str(s)) => s,
            other => {
                return Err(invalid(format!("expected resource type string, got {:?}", other)))
            }
        };
        let name = match iter.next() {
            Some(Token::Str(s)) => s,
            other => {
                return Err(invalid(format!("expected resource name string, got {:?}", other)))
            }
        };
        if iter.next() != Some(Token::Open) {
            return Err(invalid(format!(
                "expected '{{' after resource \"{}\" \"{}\"",
                rtype, name
            )));
        }

        let mut attrs = BTreeMap::new();
        loop {
            let key = match iter.next() {
                Some(Token::Close) => break,
                Some(Token::Word(key)) => key,
                other => {
                    return Err(invalid(format!(
                        "expected attribute name or '}}', got {:?}",
                        other
                    )))
                }
            };
            if iter.next() != Some(Token::Equals) {
                return Err(invalid(format!("expected '=' after '{}'", key)));
            }
            let value = match iter.next() {
                Some(Token::Str(s)) => Value::Str(s),
                Some(Token::Word(w)) if w == "true" => Value::Bool(true),
                Some(Token::Word(w)) if w == "false" => Value::Bool(false),
                Some(Token::Word(w)) => w
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| invalid(format!("invalid value for '{}': {}", key, w)))?,
                other => {
                    return Err(invalid(format!(
                        "expected value for '{}', got {:?}",
                        key, other
                    )))
                }
            };
            if attrs.insert(key.clone(), value).is_some() {
                return Err(invalid(format!("duplicate attribute '{}'", key)));
            }
        }

        let block = ResourceBlock { rtype, name, attrs };
        if blocks.iter().any(|b| b.address() == block.address()) {
            return Err(invalid(format!("duplicate resource {}", block.address())));
        }
        blocks.push(block);
    }

    Ok(blocks)
}
