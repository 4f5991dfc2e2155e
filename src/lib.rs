//! STM: Sheet Test Migrator
//!
//! Migrates manual tests and their step scripts from a spreadsheet into a
//! test-management workspace. Each test root row becomes a created manual
//! test; the step rows under it become that test's script.

pub mod cli;
pub mod core;
pub mod entities;
pub mod migration;
pub mod remote;
pub mod sheet;
