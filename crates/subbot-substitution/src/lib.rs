//! Parser and executor for `s/pattern/replacement/` substitution commands.

mod substitution_command;

pub use substitution_command::{SubstitutionCommand, SubstitutionError, SUPPORTED_DELIMITERS};
