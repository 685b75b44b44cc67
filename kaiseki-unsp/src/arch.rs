use std::collections::BTreeSet;
use std::sync::Arc;

use kaiseki_core::{
    CatalogError, DecodeOne, DecodedInstruction, Flow, Instruction, InstructionCatalog, Token,
    TokenKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BranchType {
    UnconditionalBranch(u32),
    TrueBranch(u32),
    FalseBranch(u32),
    CallDestination(u32),
    FunctionReturn,
    UnresolvedBranch,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstructionInfo {
    pub length: usize,
    pub branches: Vec<BranchType>,
}

impl InstructionInfo {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            branches: Vec::new(),
        }
    }

    pub fn add_branch(&mut self, branch: BranchType) {
        self.branches.push(branch);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextTokenType {
    Instruction,
    OperandSeparator,
    Register,
    Integer,
    PossibleAddress,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextToken {
    pub kind: TextTokenType,
    pub text: String,
    pub value: Option<u64>,
}

impl TextToken {
    pub fn new(kind: TextTokenType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            value: None,
        }
    }

    pub fn with_value(kind: TextTokenType, text: impl Into<String>, value: u64) -> Self {
        Self {
            kind,
            text: text.into(),
            value: Some(value),
        }
    }
}

impl From<&Token> for TextToken {
    fn from(token: &Token) -> Self {
        match token.kind() {
            TokenKind::Register => TextToken::new(TextTokenType::Register, token.text()),
            TokenKind::Integer(n) => {
                TextToken::with_value(TextTokenType::Integer, token.text(), n.into())
            }
            TokenKind::Address(a) => {
                TextToken::with_value(TextTokenType::PossibleAddress, token.text(), a.into())
            }
            TokenKind::Text if token.text().trim() == "," => {
                TextToken::new(TextTokenType::OperandSeparator, token.text())
            }
            TokenKind::Text | TokenKind::Symbol => {
                TextToken::new(TextTokenType::Text, token.text())
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct UnspArchitecture {
    catalog: Arc<InstructionCatalog>,
}

impl UnspArchitecture {
    pub const NAME: &'static str = "unSP";
    pub const ADDRESS_SIZE: usize = 4;
    pub const DEFAULT_INT_SIZE: usize = 4;
    pub const MAX_INSTR_LENGTH: usize = 4;
    pub const ENDIANNESS: Endianness = Endianness::Little;
    pub const STACK_POINTER: &'static str = "SP";

    pub fn new() -> Result<Self, CatalogError> {
        let catalog = crate::load_catalog()?;
        tracing::info!(
            "{} architecture ready with {} instruction templates",
            Self::NAME,
            catalog.templates().len()
        );
        Ok(Self::with_catalog(Arc::new(catalog)))
    }

    pub fn with_catalog(catalog: Arc<InstructionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<InstructionCatalog> {
        &self.catalog
    }

    pub fn registers(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.catalog
            .registers()
            .iter()
            .flat_map(|table| table.symbols().map(|(_, symbol)| symbol))
            .filter(|symbol| seen.insert(*symbol))
            .collect()
    }

    fn decode<'a>(&'a self, data: &[u8], address: u32) -> Option<DecodedInstruction<'a>> {
        match self.catalog.decoder().decode_one(data, address) {
            Ok(ins) => Some(ins),
            Err(err) => {
                tracing::debug!("0x{:08x}: {}", address, err);
                None
            }
        }
    }

    pub fn instruction_info(&self, data: &[u8], address: u32) -> Option<InstructionInfo> {
        let ins = self.decode(data, address)?;
        let mut info = InstructionInfo::new(ins.len_bytes());
        let target = ins.operands().iter().find_map(|token| match token.kind() {
            TokenKind::Address(a) => Some(a),
            _ => None,
        });

        match ins.template().flow() {
            Flow::Fallthrough => {}
            Flow::Branch => info.add_branch(match target {
                Some(t) => BranchType::UnconditionalBranch(t),
                None => BranchType::UnresolvedBranch,
            }),
            Flow::ConditionalBranch => {
                info.add_branch(match target {
                    Some(t) => BranchType::TrueBranch(t),
                    None => BranchType::UnresolvedBranch,
                });
                let next = address.wrapping_add(info.length as u32);
                info.add_branch(BranchType::FalseBranch(next));
            }
            Flow::Call => info.add_branch(match target {
                Some(t) => BranchType::CallDestination(t),
                None => BranchType::UnresolvedBranch,
            }),
            Flow::Return => info.add_branch(BranchType::FunctionReturn),
        }
        tracing::trace!("0x{:08x}: {} {:?}", address, ins.mnemonic(), info.branches);
        Some(info)
    }

    pub fn instruction_text(&self, data: &[u8], address: u32) -> Option<(Vec<TextToken>, usize)> {
        let ins = self.decode(data, address)?;
        let mut tokens = vec![TextToken::new(TextTokenType::Instruction, ins.mnemonic())];
        if !ins.operands().is_empty() {
            tokens.push(TextToken::new(TextTokenType::OperandSeparator, " "));
        }
        tokens.extend(ins.operands().iter().map(TextToken::from));
        Some((tokens, ins.len_bytes()))
    }
}
