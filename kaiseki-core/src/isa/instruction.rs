use std::fmt;

use serde::Deserialize;

use crate::cpu::opcode::{BitRange, Opcode16, OpcodePattern};
use crate::cpu::Instruction;
use crate::isa::syntax::{concat, Syntax, Token};
use crate::isa::value::ValueMap;

pub const IMMEDIATE_PREFIX: &str = "IM";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WordSelector {
    #[default]
    First,
    Second,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressPart {
    High,
    Low,
    Whole,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldRole {
    Plain,
    Register(String),
    Enumerated(ValueMap),
    CompositeAddressPart { address: String, part: AddressPart },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    #[default]
    Fallthrough,
    Branch,
    ConditionalBranch,
    Call,
    Return,
}

pub fn parse_address_part(name: &str) -> Option<(&str, AddressPart)> {
    let (base, rest) = name.split_once('[')?;
    let (_, lo) = rest.strip_suffix(']')?.split_once(':')?;
    if !base.starts_with('A') || base.len() < 2 {
        return None;
    }
    let lo: u8 = lo.trim().parse().ok()?;
    let part = if lo >= 16 {
        AddressPart::High
    } else {
        AddressPart::Low
    };
    Some((base, part))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    bits: BitRange,
    word: WordSelector,
    role: FieldRole,
}

impl FieldSpec {
    pub fn new(name: &str, bits: BitRange, word: WordSelector, role: FieldRole) -> Self {
        Self {
            name: name.to_owned(),
            bits,
            word,
            role,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> BitRange {
        self.bits
    }

    pub fn word(&self) -> WordSelector {
        self.word
    }

    pub fn role(&self) -> &FieldRole {
        &self.role
    }

    pub fn is_immediate(&self) -> bool {
        self.name.starts_with(IMMEDIATE_PREFIX)
    }

    pub fn placeholder(&self) -> &str {
        match &self.role {
            FieldRole::CompositeAddressPart {
                address,
                part: AddressPart::High | AddressPart::Low,
            } => address,
            _ => &self.name,
        }
    }

    /// Returns `None` only for a second-word field when no second word was read.
    pub fn extract(&self, first: Opcode16, second: Option<Opcode16>) -> Option<u32> {
        let word = match self.word {
            WordSelector::First => first,
            WordSelector::Second => second?,
        };
        Some(word.bits(self.bits))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved {
    Number(u32),
    Register(String),
    Symbol(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldValue {
    pub raw: u32,
    pub resolved: Resolved,
}

impl FieldValue {
    pub fn number(raw: u32) -> Self {
        Self {
            raw,
            resolved: Resolved::Number(raw),
        }
    }
}

pub struct InstructionTemplate {
    name: String,
    syntax_text: String,
    syntax: Syntax,
    pattern: OpcodePattern,
    fields: Vec<FieldSpec>,
    flow: Flow,
}

impl InstructionTemplate {
    pub fn new(
        name: &str,
        syntax: &str,
        pattern: OpcodePattern,
        fields: Vec<FieldSpec>,
        flow: Flow,
    ) -> Self {
        Self {
            name: name.to_owned(),
            syntax_text: syntax.to_owned(),
            syntax: Syntax::compile(syntax, &fields),
            pattern,
            fields,
            flow,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn syntax_text(&self) -> &str {
        &self.syntax_text
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    pub fn pattern(&self) -> &OpcodePattern {
        &self.pattern
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn needs_second_word(&self) -> bool {
        self.fields.iter().any(|f| f.word() == WordSelector::Second)
    }

    pub fn len_bytes(&self) -> usize {
        if self.needs_second_word() {
            4
        } else {
            2
        }
    }

    pub fn render(&self, values: &[FieldValue]) -> Vec<Token> {
        self.syntax.render(&self.fields, values)
    }
}

impl fmt::Debug for InstructionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionTemplate")
            .field("name", &self.name)
            .field("syntax", &self.syntax_text)
            .field("pattern", &self.pattern)
            .field("fields", &self.fields)
            .field("flow", &self.flow)
            .finish()
    }
}

impl fmt::Display for InstructionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = format!("{} {}", self.name, self.syntax_text);
        f.write_str(text.trim_end())
    }
}

pub struct DecodedInstruction<'a> {
    address: u32,
    def: &'a InstructionTemplate,
    operands: Vec<Token>,
}

impl<'a> DecodedInstruction<'a> {
    pub fn new(address: u32, def: &'a InstructionTemplate, operands: Vec<Token>) -> Self {
        Self {
            address,
            def,
            operands,
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn template(&self) -> &'a InstructionTemplate {
        self.def
    }

    pub fn mnemonic(&self) -> &'a str {
        self.def.name()
    }

    pub fn operands(&self) -> &[Token] {
        &self.operands
    }

    pub fn operand_text(&self) -> String {
        concat(&self.operands)
    }
}

impl<'a> Instruction for DecodedInstruction<'a> {
    fn len_bytes(&self) -> usize {
        self.def.len_bytes()
    }
}

impl<'a> fmt::Debug for DecodedInstruction<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedInstruction")
            .field("address", &self.address)
            .field("def", &self.def.name())
            .field("operands", &self.operands)
            .finish()
    }
}

impl<'a> fmt::Display for DecodedInstruction<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mnemonic(), self.operand_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, bits: &str, word: WordSelector, role: FieldRole) -> FieldSpec {
        FieldSpec::new(name, bits.parse().unwrap(), word, role)
    }

    #[test]
    fn can_build() {
        let rd = field(
            "Rd",
            "11:9",
            WordSelector::First,
            FieldRole::Register(String::from("Rs_Rd")),
        );
        let rs = field(
            "Rs",
            "2:0",
            WordSelector::First,
            FieldRole::Register(String::from("Rs_Rd")),
        );
        let add = InstructionTemplate::new(
            "ADD",
            "Rd, Rs",
            "0000".parse().unwrap(),
            vec![rd, rs],
            Flow::Fallthrough,
        );
        assert_eq!(&format!("{}", add), "ADD Rd, Rs");
        assert_eq!(add.len_bytes(), 2);
        assert!(!add.needs_second_word());
        assert_eq!(add.field("Rs").map(|f| f.bits().width()), Some(3));
    }

    #[test]
    fn second_word_fields_widen_the_instruction() {
        let hi = field(
            "A22[21:16]",
            "5:0",
            WordSelector::First,
            FieldRole::CompositeAddressPart {
                address: String::from("A22"),
                part: AddressPart::High,
            },
        );
        let lo = field(
            "A22[15:0]",
            "15:0",
            WordSelector::Second,
            FieldRole::CompositeAddressPart {
                address: String::from("A22"),
                part: AddressPart::Low,
            },
        );
        assert_eq!(hi.placeholder(), "A22");
        assert_eq!(lo.placeholder(), "A22");

        let first = Opcode16::new(0xF041);
        assert_eq!(lo.extract(first, None), None);
        assert_eq!(lo.extract(first, Some(Opcode16::new(0xABCD))), Some(0xABCD));
        assert_eq!(hi.extract(first, None), Some(0x01));

        let call = InstructionTemplate::new(
            "CALL",
            "A22",
            "1111000001".parse().unwrap(),
            vec![hi, lo],
            Flow::Call,
        );
        assert!(call.needs_second_word());
        assert_eq!(call.len_bytes(), 4);
    }

    #[test]
    fn recognizes_address_part_names() {
        assert_eq!(
            parse_address_part("A22[21:16]"),
            Some(("A22", AddressPart::High))
        );
        assert_eq!(
            parse_address_part("A22[15:0]"),
            Some(("A22", AddressPart::Low))
        );
        assert_eq!(parse_address_part("A16"), None);
        assert_eq!(parse_address_part("IM[5:0]"), None);
        assert_eq!(parse_address_part("A22[15]"), None);
    }
}
