use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::cpu::decoder::CatalogDecoder;
use crate::cpu::opcode::{BitRange, Opcode16, OpcodeError, OpcodePattern};
use crate::isa::instruction::{
    parse_address_part, AddressPart, FieldRole, FieldSpec, Flow, InstructionTemplate,
    WordSelector,
};
use crate::isa::register::{infer_table, RegisterError, RegisterTable, RegisterTables};
use crate::isa::value::ValueMap;

pub const SINGLE_ADDRESS_FIELD: &str = "A16";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unable to read catalog: {0}")]
    Io(#[from] io::Error),
    #[error("malformed catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed catalog: instruction {instruction}: {source}")]
    Opcode {
        instruction: String,
        source: OpcodeError,
    },
    #[error("malformed catalog: instruction {instruction}, field {field}: {source}")]
    Field {
        instruction: String,
        field: String,
        source: OpcodeError,
    },
    #[error("malformed catalog: instruction {instruction} has a field with no name")]
    UnnamedField { instruction: String },
    #[error("malformed catalog: instruction {instruction}, field {field}: no register table named {table}")]
    UnknownRegisterTable {
        instruction: String,
        field: String,
        table: String,
    },
    #[error("malformed catalog: {0}")]
    Register(#[from] RegisterError),
    #[error("ambiguous catalog: {0}")]
    Ambiguous(Ambiguity),
}

impl CatalogError {
    pub fn is_malformed(&self) -> bool {
        !matches!(self, CatalogError::Io(_) | CatalogError::Ambiguous(_))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Deserialize)]
pub struct CatalogDocument {
    pub instruction_set: Vec<TemplateDocument>,
    pub registers: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateDocument {
    pub name: String,
    pub syntax: String,
    pub encoding: EncodingDocument,
    #[serde(default)]
    pub flow: Flow,
}

#[derive(Debug, Deserialize)]
pub struct EncodingDocument {
    pub opcode: String,
    #[serde(default)]
    pub fields: Vec<FieldDocument>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDocument {
    pub name: String,
    pub bits: BitsDocument,
    #[serde(default)]
    pub second_word: bool,
    pub register: Option<RegisterDocument>,
    #[serde(default)]
    pub address: bool,
    pub values: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BitsDocument {
    Range(String),
    Bit(u8),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RegisterDocument {
    Flag(bool),
    Table(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ambiguity {
    pub pattern: String,
    pub kept: String,
    pub shadowed: String,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} shares opcode pattern {} with {} and can never match",
            self.shadowed, self.pattern, self.kept
        )
    }
}

#[derive(Debug)]
pub struct InstructionCatalog {
    templates: Vec<InstructionTemplate>,
    registers: RegisterTables,
    ambiguities: Vec<Ambiguity>,
}

impl InstructionCatalog {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::try_from(document)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_reader(reader)?;
        Self::try_from(document)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("loading instruction catalog from {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Templates in match order: longest opcode pattern first, catalog order
    /// among equal lengths.
    pub fn templates(&self) -> &[InstructionTemplate] {
        &self.templates
    }

    pub fn registers(&self) -> &RegisterTables {
        &self.registers
    }

    pub fn ambiguities(&self) -> &[Ambiguity] {
        &self.ambiguities
    }

    pub fn ensure_unambiguous(&self) -> Result<()> {
        match self.ambiguities.first() {
            Some(ambiguity) => Err(CatalogError::Ambiguous(ambiguity.clone())),
            None => Ok(()),
        }
    }

    pub fn find(&self, word: u16) -> Option<&InstructionTemplate> {
        let opcode = Opcode16::new(word);
        self.templates.iter().find(|t| t.pattern().matches(opcode))
    }

    pub fn resolve_register(&self, table: &str, raw: u32) -> String {
        self.registers.resolve(table, raw)
    }

    pub fn decoder(&self) -> CatalogDecoder<'_> {
        CatalogDecoder::new(self)
    }
}

impl TryFrom<CatalogDocument> for InstructionCatalog {
    type Error = CatalogError;

    fn try_from(document: CatalogDocument) -> Result<Self> {
        let tables = document
            .registers
            .into_iter()
            .map(|(name, symbols)| RegisterTable::new(&name, symbols))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let registers = RegisterTables::new(tables);

        let mut templates = document
            .instruction_set
            .into_iter()
            .map(|template| build_template(template, &registers))
            .collect::<Result<Vec<_>>>()?;
        // stable, so equal lengths keep catalog order
        templates.sort_by(|a, b| b.pattern().len().cmp(&a.pattern().len()));

        let ambiguities = find_ambiguities(&templates);
        for ambiguity in &ambiguities {
            tracing::warn!("{}", ambiguity);
        }

        tracing::info!(
            "loaded {} instruction templates and {} register tables",
            templates.len(),
            registers.iter().count()
        );
        Ok(Self {
            templates,
            registers,
            ambiguities,
        })
    }
}

fn find_ambiguities(templates: &[InstructionTemplate]) -> Vec<Ambiguity> {
    let mut first_seen: BTreeMap<&str, &str> = BTreeMap::new();
    let mut ambiguities = Vec::new();
    for template in templates {
        let pattern = template.pattern().as_str();
        match first_seen.get(pattern) {
            Some(kept) => ambiguities.push(Ambiguity {
                pattern: pattern.to_owned(),
                kept: kept.to_string(),
                shadowed: template.name().to_owned(),
            }),
            None => {
                first_seen.insert(pattern, template.name());
            }
        }
    }
    ambiguities
}

fn build_template(
    document: TemplateDocument,
    registers: &RegisterTables,
) -> Result<InstructionTemplate> {
    let pattern: OpcodePattern =
        document
            .encoding
            .opcode
            .parse()
            .map_err(|source| CatalogError::Opcode {
                instruction: document.name.clone(),
                source,
            })?;
    let fields = document
        .encoding
        .fields
        .into_iter()
        .map(|field| build_field(&document.name, field, registers))
        .collect::<Result<Vec<_>>>()?;
    Ok(InstructionTemplate::new(
        &document.name,
        &document.syntax,
        pattern,
        fields,
        document.flow,
    ))
}

fn build_field(
    instruction: &str,
    document: FieldDocument,
    registers: &RegisterTables,
) -> Result<FieldSpec> {
    if document.name.is_empty() {
        return Err(CatalogError::UnnamedField {
            instruction: instruction.to_owned(),
        });
    }
    let bits = match &document.bits {
        BitsDocument::Range(text) => text.parse(),
        BitsDocument::Bit(bit) => BitRange::single(*bit),
    }
    .map_err(|source| CatalogError::Field {
        instruction: instruction.to_owned(),
        field: document.name.clone(),
        source,
    })?;
    let word = if document.second_word {
        WordSelector::Second
    } else {
        WordSelector::First
    };

    let role = match &document.register {
        Some(RegisterDocument::Table(table)) => {
            if !registers.contains(table) {
                return Err(CatalogError::UnknownRegisterTable {
                    instruction: instruction.to_owned(),
                    field: document.name.clone(),
                    table: table.clone(),
                });
            }
            FieldRole::Register(table.clone())
        }
        Some(RegisterDocument::Flag(true)) => {
            FieldRole::Register(infer_table(&document.name).to_owned())
        }
        _ => address_role(&document)
            .or_else(|| enumerated_role(&document, bits))
            .unwrap_or(FieldRole::Plain),
    };
    Ok(FieldSpec::new(&document.name, bits, word, role))
}

fn address_role(document: &FieldDocument) -> Option<FieldRole> {
    if let Some((address, part)) = parse_address_part(&document.name) {
        return Some(FieldRole::CompositeAddressPart {
            address: address.to_owned(),
            part,
        });
    }
    (document.address || document.name == SINGLE_ADDRESS_FIELD).then(|| {
        FieldRole::CompositeAddressPart {
            address: document.name.clone(),
            part: AddressPart::Whole,
        }
    })
}

fn enumerated_role(document: &FieldDocument, bits: BitRange) -> Option<FieldRole> {
    // scraped catalogs sometimes carry non-object `values`; those are ignored
    let serde_json::Value::Object(entries) = document.values.as_ref()? else {
        return None;
    };
    let symbols = entries
        .iter()
        .map(|(code, symbol)| {
            let symbol = match symbol {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (code.clone(), symbol)
        })
        .collect();
    Some(FieldRole::Enumerated(ValueMap::new(
        usize::from(bits.width()),
        symbols,
    )))
}
