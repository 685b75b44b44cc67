pub mod instruction;
pub mod register;
pub mod syntax;
pub mod value;
