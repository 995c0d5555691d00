//! CLI command implementations.

pub mod exec;
pub mod modules;
pub mod routes;
pub mod serve;
