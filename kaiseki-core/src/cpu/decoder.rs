use thiserror::Error;

use crate::catalog::InstructionCatalog;
use crate::cpu::opcode::{Opcode16, WORD_BYTES};
use crate::cpu::Instruction;
use crate::isa::instruction::{DecodedInstruction, FieldRole, FieldSpec, FieldValue, Resolved};

#[derive(Debug, Error, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecodeError {
    #[error("Insufficient data")]
    InsufficientData,
    #[error("Unknown instruction: 0x{0:04x}")]
    UnknownOpcode(u16),
    #[error("Incomplete instruction {0} (needs second word)")]
    IncompleteInstruction(String),
}

impl DecodeError {
    pub fn bytes_consumed(&self) -> usize {
        match self {
            DecodeError::InsufficientData => 0,
            DecodeError::UnknownOpcode(_) | DecodeError::IncompleteInstruction(_) => WORD_BYTES,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

pub trait DecodeOne {
    type Instruction: Instruction;

    fn decode_one(&self, bytes: &[u8], address: u32) -> Result<Self::Instruction>;
}

#[derive(Clone, Copy, Debug)]
pub struct CatalogDecoder<'c> {
    catalog: &'c InstructionCatalog,
}

impl<'c> CatalogDecoder<'c> {
    pub fn new(catalog: &'c InstructionCatalog) -> Self {
        Self { catalog }
    }

    fn resolve(&self, field: &FieldSpec, raw: u32) -> FieldValue {
        let resolved = match field.role() {
            FieldRole::Register(table) => {
                Resolved::Register(self.catalog.resolve_register(table, raw))
            }
            FieldRole::Enumerated(map) => match map.lookup(raw) {
                Some(symbol) => Resolved::Symbol(symbol.to_owned()),
                None => Resolved::Number(raw),
            },
            FieldRole::Plain | FieldRole::CompositeAddressPart { .. } => Resolved::Number(raw),
        };
        FieldValue { raw, resolved }
    }
}

impl<'c> DecodeOne for CatalogDecoder<'c> {
    type Instruction = DecodedInstruction<'c>;

    fn decode_one(&self, bytes: &[u8], address: u32) -> Result<Self::Instruction> {
        let first = Opcode16::from_le_bytes(bytes).ok_or(DecodeError::InsufficientData)?;
        let Some(template) = self.catalog.find(first.value()) else {
            tracing::debug!("0x{:08x}: no template matches {:?}", address, first);
            return Err(DecodeError::UnknownOpcode(first.value()));
        };

        let second = if template.needs_second_word() {
            let word = bytes.get(WORD_BYTES..).and_then(Opcode16::from_le_bytes);
            if word.is_none() {
                tracing::debug!("0x{:08x}: {} is missing its second word", address, template.name());
                return Err(DecodeError::IncompleteInstruction(template.name().to_owned()));
            }
            word
        } else {
            None
        };

        let values: Vec<FieldValue> = template
            .fields()
            .iter()
            .map(|field| {
                // a second word is always present when a field selects it
                let raw = field.extract(first, second).unwrap_or_default();
                self.resolve(field, raw)
            })
            .collect();
        tracing::trace!(
            "0x{:08x}: {:?} matched {} ({})",
            address,
            first,
            template.name(),
            template.pattern()
        );
        Ok(DecodedInstruction::new(
            address,
            template,
            template.render(&values),
        ))
    }
}

/// Decodes one instruction into `(mnemonic, operand text, bytes consumed)`.
///
/// Failures come back as text in the mnemonic position with empty operands,
/// except an incomplete instruction, which keeps its real mnemonic.
pub fn decode(catalog: &InstructionCatalog, bytes: &[u8], address: u32) -> (String, String, u8) {
    match catalog.decoder().decode_one(bytes, address) {
        Ok(ins) => (
            ins.mnemonic().to_owned(),
            ins.operand_text(),
            ins.len_bytes() as u8,
        ),
        Err(DecodeError::IncompleteInstruction(mnemonic)) => {
            (mnemonic, String::new(), WORD_BYTES as u8)
        }
        Err(err) => (err.to_string(), String::new(), err.bytes_consumed() as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "instruction_set": [
            { "name": "NOP", "syntax": "", "encoding": { "opcode": "0000000100000000" } },
            { "name": "CALL", "syntax": "A22", "flow": "call", "encoding": {
                "opcode": "1111000001",
                "fields": [
                    { "name": "A22[21:16]", "bits": "5:0" },
                    { "name": "A22[15:0]", "bits": "15:0", "second_word": true }
                ] } },
            { "name": "MOV", "syntax": "Rd, Rs", "encoding": { "opcode": "0101", "fields": [
                { "name": "Rd", "bits": "11:9", "register": true },
                { "name": "Rs", "bits": "2:0", "register": true } ] } },
            { "name": "INT", "syntax": "FI", "encoding": { "opcode": "11110001010000", "fields": [
                { "name": "FI", "bits": "1:0", "values": { "00": "OFF", "01": "IRQ", "10": "FIQ" } } ] } },
            { "name": "LOAD", "syntax": "Rd, {D:}[A16]", "encoding": { "opcode": "1001", "fields": [
                { "name": "Rd", "bits": "11:9", "register": true },
                { "name": "D", "bits": "5" },
                { "name": "A16", "bits": "15:0", "second_word": true } ] } },
            { "name": "XFER", "syntax": "Rx, A22, FI", "encoding": { "opcode": "1010000", "fields": [
                { "name": "A22[15:0]", "bits": "15:0", "second_word": true },
                { "name": "Rx", "bits": "15:13", "second_word": true, "register": true },
                { "name": "A22[21:16]", "bits": "5:0" },
                { "name": "FI", "bits": "1:0", "second_word": true,
                  "values": { "00": "OFF", "01": "IRQ", "10": "FIQ" } } ] } }
        ],
        "registers": {
            "Rs_Rd": {
                "000": "SP", "001": "R1", "010": "R2", "011": "R3",
                "100": "R4", "101": "BP", "110": "SR"
            },
            "Rx_Ry": { "000": "SP", "001": "R1", "111": "PC" }
        }
    }"#;

    fn harness(bytes: &[u8]) -> std::result::Result<(String, usize), DecodeError> {
        let catalog = InstructionCatalog::from_json_str(CATALOG).unwrap();
        let decoder = catalog.decoder();
        decoder
            .decode_one(bytes, 0)
            .map(|ins| (ins.to_string(), ins.len_bytes()))
    }

    #[test]
    fn short_buffers_are_insufficient() {
        assert_eq!(harness(&[]), Err(DecodeError::InsufficientData));
        assert_eq!(harness(&[0x00]), Err(DecodeError::InsufficientData));
        assert_eq!(DecodeError::InsufficientData.bytes_consumed(), 0);
        assert_eq!(DecodeError::InsufficientData.to_string(), "Insufficient data");
    }

    #[test]
    fn decodes_operandless_instruction() {
        assert_eq!(harness(&[0x00, 0x01]), Ok((String::from("NOP "), 2)));
    }

    #[test]
    fn unknown_opcode_consumes_one_word() {
        let err = harness(&[0xFF, 0xFF]).unwrap_err();
        assert_eq!(err, DecodeError::UnknownOpcode(0xFFFF));
        assert_eq!(err.to_string(), "Unknown instruction: 0xffff");
        assert_eq!(err.bytes_consumed(), 2);
    }

    #[test]
    fn two_word_instruction_consumes_four_bytes() {
        assert_eq!(
            harness(&[0x41, 0xF0, 0xCD, 0xAB]),
            Ok((String::from("CALL 0x01abcd"), 4))
        );
    }

    #[test]
    fn missing_second_word_is_incomplete() {
        for bytes in [&[0x41, 0xF0][..], &[0x41, 0xF0, 0xCD][..]] {
            let err = harness(bytes).unwrap_err();
            assert_eq!(err, DecodeError::IncompleteInstruction(String::from("CALL")));
            assert_eq!(err.to_string(), "Incomplete instruction CALL (needs second word)");
            assert_eq!(err.bytes_consumed(), 2);
        }
    }

    #[test]
    fn resolves_registers_with_placeholder_for_missing_codes() {
        // MOV R1, R2: 0101 001 000000 010
        assert_eq!(harness(&[0x02, 0x52]), Ok((String::from("MOV R1, R2"), 2)));
        // MOV Unknown(111), SP: 0101 111 000000 000
        assert_eq!(
            harness(&[0x00, 0x5E]),
            Ok((String::from("MOV Unknown(111), SP"), 2))
        );
    }

    #[test]
    fn maps_enumerated_values_or_keeps_the_number() {
        assert_eq!(harness(&[0x41, 0xF1]), Ok((String::from("INT IRQ"), 2)));
        assert_eq!(harness(&[0x42, 0xF1]), Ok((String::from("INT FIQ"), 2)));
        assert_eq!(harness(&[0x43, 0xF1]), Ok((String::from("INT 3"), 2)));
    }

    #[test]
    fn second_word_address_and_decoration() {
        // LOAD R3, D:[0x1234]: 1001 011 000 1 00000, then 0x1234
        assert_eq!(
            harness(&[0x20, 0x96, 0x34, 0x12]),
            Ok((String::from("LOAD R3, D:[0x1234]"), 4))
        );
        assert_eq!(
            harness(&[0x00, 0x96, 0x34, 0x00]),
            Ok((String::from("LOAD R3, [0x0034]"), 4))
        );
    }

    #[test]
    fn second_word_fields_resolve_like_first_word_fields() {
        // XFER: 1010000 000 111111, then Rx=111 FI=01 in 0xE001
        assert_eq!(
            harness(&[0x3F, 0xA0, 0x01, 0xE0]),
            Ok((String::from("XFER PC, 0x3fe001, IRQ"), 4))
        );
        // Rx=010 has no entry in Rx_Ry
        assert_eq!(
            harness(&[0x01, 0xA0, 0x02, 0x40]),
            Ok((String::from("XFER Unknown(010), 0x014002, FIQ"), 4))
        );
        // FI=11 is unmapped and stays numeric
        assert_eq!(
            harness(&[0x00, 0xA0, 0x03, 0x20]),
            Ok((String::from("XFER R1, 0x002003, 3"), 4))
        );
        assert_eq!(
            harness(&[0x3F, 0xA0]),
            Err(DecodeError::IncompleteInstruction(String::from("XFER")))
        );
    }

    #[test]
    fn decode_entry_point_returns_parts() {
        let catalog = InstructionCatalog::from_json_str(CATALOG).unwrap();
        assert_eq!(
            decode(&catalog, &[0x02, 0x52], 0x100),
            (String::from("MOV"), String::from("R1, R2"), 2)
        );
        assert_eq!(
            decode(&catalog, &[0x41, 0xF0], 0),
            (String::from("CALL"), String::new(), 2)
        );
        assert_eq!(
            decode(&catalog, &[0xFF, 0xFF], 0),
            (String::from("Unknown instruction: 0xffff"), String::new(), 2)
        );
        assert_eq!(
            decode(&catalog, &[0x01], 0),
            (String::from("Insufficient data"), String::new(), 0)
        );
    }

    #[test]
    fn decoded_instruction_keeps_its_address_and_template() {
        let catalog = InstructionCatalog::from_json_str(CATALOG).unwrap();
        let ins = catalog.decoder().decode_one(&[0x41, 0xF0, 0xCD, 0xAB], 0x80).unwrap();
        assert_eq!(ins.address(), 0x80);
        assert_eq!(ins.mnemonic(), "CALL");
        assert_eq!(ins.template().pattern().as_str(), "1111000001");
        assert_eq!(ins.operand_text(), "0x01abcd");
    }
}
