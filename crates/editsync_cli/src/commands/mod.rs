//! CLI command implementations.

pub mod clear;
pub mod download;
pub mod inspect;
pub mod migrate;
