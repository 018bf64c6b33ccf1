pub mod common;
pub mod disasm;
pub mod methods;
pub mod patch;
pub mod types;
