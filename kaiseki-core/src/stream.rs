use std::io;

use crate::catalog::InstructionCatalog;
use crate::cpu::decoder::{CatalogDecoder, DecodeOne};
use crate::cpu::Instruction;

#[derive(Clone, Copy, Debug)]
pub struct StreamDisassembler<'c> {
    decoder: CatalogDecoder<'c>,
}

impl<'c> StreamDisassembler<'c> {
    pub fn new(catalog: &'c InstructionCatalog) -> Self {
        Self {
            decoder: catalog.decoder(),
        }
    }

    pub fn lines<'b>(&self, bytes: &'b [u8], base_address: u32) -> Lines<'c, 'b> {
        Lines {
            decoder: self.decoder,
            remaining: bytes,
            address: base_address,
            state: StreamState::Scanning,
        }
    }

    pub fn disassemble(&self, bytes: &[u8], base_address: u32) -> Vec<String> {
        self.lines(bytes, base_address).collect()
    }

    /// Lines joined with `\n`, without a trailing newline.
    pub fn disassemble_to_string(&self, bytes: &[u8], base_address: u32) -> String {
        self.disassemble(bytes, base_address).join("\n")
    }

    pub fn write_to<W: io::Write>(
        &self,
        writer: &mut W,
        bytes: &[u8],
        base_address: u32,
    ) -> io::Result<()> {
        for (idx, line) in self.lines(bytes, base_address).enumerate() {
            if idx > 0 {
                writer.write_all(b"\n")?;
            }
            writer.write_all(line.as_bytes())?;
        }
        writer.flush()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StreamState {
    Scanning,
    Done,
}

#[derive(Clone, Debug)]
pub struct Lines<'c, 'b> {
    decoder: CatalogDecoder<'c>,
    remaining: &'b [u8],
    address: u32,
    state: StreamState,
}

impl<'c, 'b> Lines<'c, 'b> {
    pub fn address(&self) -> u32 {
        self.address
    }
}

impl<'c, 'b> Iterator for Lines<'c, 'b> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == StreamState::Done || self.remaining.is_empty() {
            self.state = StreamState::Done;
            return None;
        }

        let (text, consumed) = match self.decoder.decode_one(self.remaining, self.address) {
            Ok(ins) => (ins.to_string(), ins.len_bytes()),
            Err(err) => (err.to_string(), err.bytes_consumed()),
        };
        // a step that consumes nothing would never finish
        if consumed == 0 {
            tracing::debug!(
                "0x{:08x}: stopping with {} trailing byte(s)",
                self.address,
                self.remaining.len()
            );
            self.state = StreamState::Done;
            return None;
        }

        let line = format!("{:08x}: {}", self.address, text);
        self.remaining = &self.remaining[consumed..];
        self.address = self.address.wrapping_add(consumed as u32);
        Some(line)
    }
}
