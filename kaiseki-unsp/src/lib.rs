pub mod arch;

use kaiseki_core::{CatalogError, InstructionCatalog};

pub use crate::arch::UnspArchitecture;

pub const UNSP_CATALOG_JSON: &str = include_str!("../assets/unsp_instruction_set.json");

pub fn load_catalog() -> Result<InstructionCatalog, CatalogError> {
    InstructionCatalog::from_json_str(UNSP_CATALOG_JSON)
}
