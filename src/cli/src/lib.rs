//! A3S Delta CLI - ship container image upgrades as layer diffs.

pub mod commands;
pub mod output;
