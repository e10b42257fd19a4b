//! Unit tests for rust-sqlindex
//!
//! This file serves as the entry point for all unit tests.

#[path = "unit/parser_tests.rs"]
mod parser_tests;

#[path = "unit/structured_tests.rs"]
mod structured_tests;
