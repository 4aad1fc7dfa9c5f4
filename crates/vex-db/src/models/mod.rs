//! Row types and read queries.

pub mod flag;
pub mod project;
pub mod token;

pub use flag::{Flag, FlagType};
pub use project::Project;
pub use token::Token;
