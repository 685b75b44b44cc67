pub mod catalog;
pub mod cpu;
pub mod isa;
pub mod stream;

pub use crate::catalog::{Ambiguity, CatalogError, InstructionCatalog};
pub use crate::cpu::decoder::{decode, CatalogDecoder, DecodeError, DecodeOne};
pub use crate::cpu::opcode::{BitRange, Opcode16, OpcodePattern};
pub use crate::cpu::Instruction;
pub use crate::isa::instruction::{
    AddressPart, DecodedInstruction, FieldRole, FieldSpec, Flow, InstructionTemplate,
    WordSelector,
};
pub use crate::isa::register::{RegisterTable, RegisterTables};
pub use crate::isa::syntax::{Token, TokenKind};
pub use crate::stream::{Lines, StreamDisassembler};
