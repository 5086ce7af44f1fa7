pub mod errors;
pub mod format;
pub mod offset_types;
pub mod position;
pub mod revision;
pub mod tree;
pub mod writer;
