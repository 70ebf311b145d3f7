use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use super::FlagError;
use crate::types::{LabelSelector, LabelSelectorOperator, LabelSelectorRequirement};

const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// A `-l/--selector` value. Unset until the flag is given; an empty string
/// sets an empty selector that matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelectorFlag {
    selector: Option<LabelSelector>,
}

impl LabelSelectorFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, raw: &str) -> Result<(), FlagError> {
        self.selector = Some(parse_selector(raw)?);
        Ok(())
    }

    pub fn parse(raw: &str) -> Result<Self, FlagError> {
        let mut flag = Self::new();
        flag.set(raw)?;
        Ok(flag)
    }

    pub fn selector(&self) -> Option<&LabelSelector> {
        self.selector.as_ref()
    }

}

impl fmt::Display for LabelSelectorFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Some(selector) => f.write_str(&format_selector(selector)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Identifier(String),
    In,
    NotIn,
    Not,
    Equals,
    DoubleEquals,
    NotEquals,
    GreaterThan,
    LessThan,
    OpenParen,
    CloseParen,
    Comma,
}

impl Token {
    /// Text usable as a key or value. Keywords are accepted as plain words
    /// in those positions.
    fn word(&self) -> Option<&str> {
        match self {
            Token::Identifier(s) => Some(s.as_str()),
            Token::In => Some("in"),
            Token::NotIn => Some("notin"),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Token::Identifier(s) => format!("{s:?}"),
            Token::In => "'in'".to_string(),
            Token::NotIn => "'notin'".to_string(),
            Token::Not => "'!'".to_string(),
            Token::Equals => "'='".to_string(),
            Token::DoubleEquals => "'=='".to_string(),
            Token::NotEquals => "'!='".to_string(),
            Token::GreaterThan => "'>'".to_string(),
            Token::LessThan => "'<'".to_string(),
            Token::OpenParen => "'('".to_string(),
            Token::CloseParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '!' | '=' | '(' | ')' | ',' | '<' | '>')
}

fn lex(input: &str) -> Vec<Token> {
    let mut chars: Peekable<CharIndices<'_>> = input.char_indices().peekable();
    let mut tokens = Vec::new();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            ',' => Token::Comma,
            '>' => Token::GreaterThan,
            '<' => Token::LessThan,
            '!' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::NotEquals
                } else {
                    Token::Not
                }
            }
            '=' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::DoubleEquals
                } else {
                    Token::Equals
                }
            }
            _ => {
                let mut end = start + c.len_utf8();
                while let Some((i, n)) =
                    chars.next_if(|&(_, n)| !n.is_whitespace() && !is_special(n))
                {
                    end = i + n.len_utf8();
                }
                match &input[start..end] {
                    "in" => Token::In,
                    "notin" => Token::NotIn,
                    word => Token::Identifier(word.to_string()),
                }
            }
        };
        tokens.push(token);
    }

    tokens
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            tokens: lex(input),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> FlagError {
        FlagError::MalformedSelector {
            selector: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn unexpected(&self, token: Option<&Token>, expected: &str) -> FlagError {
        match token {
            Some(t) => self.error(format!("found {}, expected {expected}", t.describe())),
            None => self.error(format!("unexpected end of selector, expected {expected}")),
        }
    }

    fn parse(mut self) -> Result<LabelSelector, FlagError> {
        let mut selector = LabelSelector::default();
        if self.tokens.is_empty() {
            return Ok(selector);
        }

        loop {
            self.parse_requirement(&mut selector)?;
            match self.advance() {
                None => break,
                Some(Token::Comma) => continue,
                Some(t) => return Err(self.unexpected(Some(&t), "','")),
            }
        }

        selector.match_expressions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(selector)
    }

    fn parse_requirement(&mut self, selector: &mut LabelSelector) -> Result<(), FlagError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let key = self.parse_key()?;
            selector.match_expressions.push(LabelSelectorRequirement {
                key,
                operator: LabelSelectorOperator::DoesNotExist,
                values: Vec::new(),
            });
            return Ok(());
        }

        let key = self.parse_key()?;
        match self.peek().cloned() {
            None | Some(Token::Comma) => {
                selector.match_expressions.push(LabelSelectorRequirement {
                    key,
                    operator: LabelSelectorOperator::Exists,
                    values: Vec::new(),
                });
            }
            Some(Token::Equals) | Some(Token::DoubleEquals) => {
                self.advance();
                let value = self.parse_exact_value()?;
                selector.match_labels.insert(key, value);
            }
            Some(Token::NotEquals) => {
                self.advance();
                let value = self.parse_exact_value()?;
                selector.match_expressions.push(LabelSelectorRequirement {
                    key,
                    operator: LabelSelectorOperator::NotIn,
                    values: vec![value],
                });
            }
            Some(Token::In) | Some(Token::NotIn) => {
                let operator = match self.advance() {
                    Some(Token::In) => LabelSelectorOperator::In,
                    _ => LabelSelectorOperator::NotIn,
                };
                let values = self.parse_value_set()?;
                selector.match_expressions.push(LabelSelectorRequirement {
                    key,
                    operator,
                    values,
                });
            }
            Some(op @ (Token::GreaterThan | Token::LessThan)) => {
                return Err(self.error(format!(
                    "operator {} is not supported in label selector objects",
                    op.describe()
                )));
            }
            token => {
                return Err(self.unexpected(
                    token.as_ref(),
                    "an operator ('=', '==', '!=', 'in', 'notin') or ','",
                ));
            }
        }
        Ok(())
    }

    fn parse_key(&mut self) -> Result<String, FlagError> {
        let token = self.advance();
        let Some(key) = token.as_ref().and_then(Token::word) else {
            return Err(self.unexpected(token.as_ref(), "a label key"));
        };
        validate_key(key).map_err(|reason| self.error(reason))?;
        Ok(key.to_string())
    }

    fn parse_value(&mut self, terminators: &[Token]) -> Result<String, FlagError> {
        match self.peek().cloned() {
            None => Ok(String::new()),
            Some(t) if terminators.contains(&t) => Ok(String::new()),
            Some(t) => {
                let Some(value) = t.word().map(str::to_string) else {
                    return Err(self.unexpected(Some(&t), "a label value"));
                };
                self.advance();
                validate_value(&value).map_err(|reason| self.error(reason))?;
                Ok(value)
            }
        }
    }

    fn parse_exact_value(&mut self) -> Result<String, FlagError> {
        self.parse_value(&[Token::Comma])
    }

    fn parse_value_set(&mut self) -> Result<Vec<String>, FlagError> {
        match self.advance() {
            Some(Token::OpenParen) => {}
            t => return Err(self.unexpected(t.as_ref(), "'('")),
        }

        let mut values = Vec::new();
        loop {
            if self.peek().is_none() {
                return Err(self.unexpected(None, "')'"));
            }
            values.push(self.parse_value(&[Token::Comma, Token::CloseParen])?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::CloseParen) => break,
                t => return Err(self.unexpected(t.as_ref(), "',' or ')'")),
            }
        }

        values.sort();
        values.dedup();
        Ok(values)
    }
}

fn is_alphanumeric(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// `[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?` up to 63 characters.
fn is_label_name(s: &str) -> bool {
    let (Some(first), Some(last)) = (s.chars().next(), s.chars().last()) else {
        return false;
    };
    let allowed = |c: char| is_alphanumeric(c) || matches!(c, '-' | '_' | '.');
    s.len() <= MAX_NAME_LEN
        && is_alphanumeric(first)
        && is_alphanumeric(last)
        && s.chars().all(allowed)
}

fn is_dns_label(part: &str) -> bool {
    let (Some(first), Some(last)) = (part.chars().next(), part.chars().last()) else {
        return false;
    };
    let lower_alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    lower_alnum(first) && lower_alnum(last) && part.chars().all(|c| lower_alnum(c) || c == '-')
}

fn is_dns_subdomain(s: &str) -> bool {
    s.len() <= MAX_PREFIX_LEN && s.split('.').all(is_dns_label)
}

fn validate_key(key: &str) -> Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if !is_dns_subdomain(prefix) {
            return Err(format!(
                "invalid label key {key:?}: prefix must be a lowercase DNS subdomain"
            ));
        }
    }
    if !is_label_name(name) {
        return Err(format!(
            "invalid label key {key:?}: name must be at most {MAX_NAME_LEN} characters, \
             start and end with an alphanumeric character and contain only '-', '_', '.' \
             or alphanumerics"
        ));
    }
    Ok(())
}

fn validate_value(value: &str) -> Result<(), String> {
    if value.is_empty() || is_label_name(value) {
        Ok(())
    } else {
        Err(format!(
            "invalid label value {value:?}: must be empty or at most {MAX_NAME_LEN} characters, \
             start and end with an alphanumeric character and contain only '-', '_', '.' \
             or alphanumerics"
        ))
    }
}

/// Parses label selector syntax such as `app=web,tier in (a,b),!legacy`.
pub fn parse_selector(input: &str) -> Result<LabelSelector, FlagError> {
    Parser::new(input).parse()
}

/// Formats a selector in canonical text form, requirements ordered by key.
/// An empty selector formats as an empty string.
pub fn format_selector(selector: &LabelSelector) -> String {
    let mut requirements: Vec<(&str, String)> = selector
        .match_labels
        .iter()
        .map(|(k, v)| (k.as_str(), format!("{k}={v}")))
        .collect();

    for expr in &selector.match_expressions {
        let text = match expr.operator {
            LabelSelectorOperator::In => format!("{} in ({})", expr.key, expr.values.join(",")),
            LabelSelectorOperator::NotIn => {
                format!("{} notin ({})", expr.key, expr.values.join(","))
            }
            LabelSelectorOperator::Exists => expr.key.clone(),
            LabelSelectorOperator::DoesNotExist => format!("!{}", expr.key),
        };
        requirements.push((expr.key.as_str(), text));
    }

    requirements.sort_by(|a, b| a.0.cmp(b.0));
    requirements
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join(",")
}
