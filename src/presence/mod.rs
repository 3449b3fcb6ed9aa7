//! Daily presence sheets: lifecycle, storage port and per-role redaction.

pub mod mysql;
pub mod service;
pub mod store;
pub mod visibility;

#[cfg(test)]
pub mod memory;
