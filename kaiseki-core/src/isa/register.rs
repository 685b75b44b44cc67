use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("register table {table}: code {code:?} is not a binary string")]
    InvalidCode { table: String, code: String },
    #[error("register table {table}: code {code:?} is not {width} bits wide")]
    InconsistentWidth {
        table: String,
        code: String,
        width: usize,
    },
}

pub type Result<T> = std::result::Result<T, RegisterError>;

pub fn infer_table(field_name: &str) -> &'static str {
    if field_name.starts_with("Ra") || field_name.starts_with("Rb") {
        "Ra_Rb"
    } else if field_name.starts_with("Rx") || field_name.starts_with("Ry") {
        "Rx_Ry"
    } else {
        "Rs_Rd"
    }
}

fn default_width(table: &str) -> usize {
    match table {
        "Ra_Rb" => 4,
        _ => 3,
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RegisterTable {
    name: String,
    width: usize,
    symbols: BTreeMap<String, String>,
}

impl RegisterTable {
    pub fn new(name: &str, symbols: BTreeMap<String, String>) -> Result<Self> {
        let width = symbols
            .keys()
            .next()
            .map(String::len)
            .unwrap_or_else(|| default_width(name));
        for code in symbols.keys() {
            if code.is_empty() || !code.bytes().all(|b| b == b'0' || b == b'1') {
                return Err(RegisterError::InvalidCode {
                    table: name.to_owned(),
                    code: code.clone(),
                });
            }
            if code.len() != width {
                return Err(RegisterError::InconsistentWidth {
                    table: name.to_owned(),
                    code: code.clone(),
                    width,
                });
            }
        }
        Ok(Self {
            name: name.to_owned(),
            width,
            symbols,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn code(&self, raw: u32) -> String {
        format!("{:0width$b}", raw, width = self.width)
    }

    pub fn lookup(&self, raw: u32) -> Option<&str> {
        self.symbols.get(&self.code(raw)).map(String::as_str)
    }

    /// Never fails: codes missing from the table come back as `Unknown(<bits>)`.
    pub fn resolve(&self, raw: u32) -> String {
        match self.lookup(raw) {
            Some(symbol) => symbol.to_owned(),
            None => {
                let code = self.code(raw);
                tracing::debug!("register table {} has no entry for {}", self.name, code);
                format!("Unknown({})", code)
            }
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&str, &str)> {
        self.symbols.iter().map(|(c, s)| (c.as_str(), s.as_str()))
    }
}

impl fmt::Debug for RegisterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{} ({} bits, {} entries)",
            self.name,
            self.width,
            self.symbols.len()
        ))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterTables {
    tables: BTreeMap<String, RegisterTable>,
}

impl RegisterTables {
    pub fn new(tables: impl IntoIterator<Item = RegisterTable>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.name().to_owned(), t))
                .collect(),
        }
    }

    pub fn get(&self, table: &str) -> Option<&RegisterTable> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn resolve(&self, table: &str, raw: u32) -> String {
        match self.tables.get(table) {
            Some(t) => t.resolve(raw),
            None => format!("R{}", raw),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterTable> {
        self.tables.values()
    }
}
