pub mod builder;
pub mod operation;
