use std::fmt;

use crate::isa::instruction::{AddressPart, FieldRole, FieldSpec, FieldValue, Resolved};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Register,
    Integer(u32),
    Address(u32),
    Symbol,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    kind: TokenKind,
    text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub fn concat(tokens: &[Token]) -> String {
    tokens.iter().map(Token::text).collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(usize),
    Address(String),
    Decoration(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Syntax {
    segments: Vec<Segment>,
}

fn decoration(rest: &str) -> Option<(&str, &str)> {
    let inner = rest.strip_prefix('{')?;
    let end = inner.find(":}")?;
    let flag = &inner[..end];
    let bad = |c: char| c.is_whitespace() || matches!(c, '{' | '}' | ':');
    if flag.is_empty() || flag.contains(bad) {
        return None;
    }
    Some((flag, &inner[end + 2..]))
}

impl Syntax {
    pub fn compile(text: &str, fields: &[FieldSpec]) -> Self {
        let mut placeholders: Vec<(&str, Segment)> = Vec::new();
        for (idx, field) in fields.iter().enumerate() {
            let name = field.placeholder();
            if name.is_empty() || placeholders.iter().any(|(n, _)| *n == name) {
                continue;
            }
            let segment = match field.role() {
                FieldRole::CompositeAddressPart {
                    address,
                    part: AddressPart::High | AddressPart::Low,
                } => Segment::Address(address.clone()),
                _ => Segment::Field(idx),
            };
            placeholders.push((name, segment));
        }
        placeholders.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;
        // decorations first, then the longest placeholder starting here
        while let Some(c) = rest.chars().next() {
            let found = match decoration(rest) {
                Some((flag, tail)) => Some((Segment::Decoration(flag.to_owned()), tail)),
                None => placeholders
                    .iter()
                    .find(|(name, _)| rest.starts_with(name))
                    .map(|(name, segment)| (segment.clone(), &rest[name.len()..])),
            };
            match found {
                Some((segment, tail)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                    rest = tail;
                }
                None => {
                    literal.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// `values` is parallel to `fields`.
    pub fn render(&self, fields: &[FieldSpec], values: &[FieldValue]) -> Vec<Token> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Text(text) => Some(Token::new(TokenKind::Text, text.as_str())),
                Segment::Field(idx) => fields
                    .get(*idx)
                    .zip(values.get(*idx))
                    .map(|(field, value)| render_field(field, value)),
                Segment::Address(address) => Some(render_composite(address, fields, values)),
                Segment::Decoration(flag) => render_decoration(flag, fields, values),
            })
            .collect()
    }
}

fn render_field(field: &FieldSpec, value: &FieldValue) -> Token {
    match &value.resolved {
        Resolved::Register(name) => Token::new(TokenKind::Register, name.as_str()),
        Resolved::Symbol(symbol) => Token::new(TokenKind::Symbol, symbol.as_str()),
        Resolved::Number(n) => match field.role() {
            FieldRole::CompositeAddressPart {
                part: AddressPart::Whole,
                ..
            } => Token::new(TokenKind::Address(*n), format!("0x{:04x}", n)),
            _ if field.is_immediate() => Token::new(TokenKind::Integer(*n), format!("0x{:x}", n)),
            _ => Token::new(TokenKind::Integer(*n), n.to_string()),
        },
    }
}

fn render_composite(address: &str, fields: &[FieldSpec], values: &[FieldValue]) -> Token {
    let part = |wanted: AddressPart| {
        fields
            .iter()
            .zip(values)
            .find_map(|(field, value)| match field.role() {
                FieldRole::CompositeAddressPart { address: a, part: p }
                    if a == address && *p == wanted =>
                {
                    Some(value.raw)
                }
                _ => None,
            })
    };
    match (part(AddressPart::High), part(AddressPart::Low)) {
        (Some(high), Some(low)) => {
            let value = (high << 16) | low;
            Token::new(TokenKind::Address(value), format!("0x{:06x}", value))
        }
        // half an address: leave the placeholder in the text
        _ => Token::new(TokenKind::Text, address),
    }
}

fn render_decoration(flag: &str, fields: &[FieldSpec], values: &[FieldValue]) -> Option<Token> {
    let raw = fields
        .iter()
        .zip(values)
        .find(|(field, _)| field.name() == flag)
        .map_or(0, |(_, value)| value.raw);
    (raw != 0).then(|| Token::new(TokenKind::Text, format!("{}:", flag)))
}
