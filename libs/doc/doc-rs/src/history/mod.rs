pub mod action;
pub mod entry;
pub mod properties;
pub mod revert;
pub mod stack;
