//! Bundles a Lua project into a single deployable script.
//!
//! Starting at the entry module, every `require`d module is located, read once
//! and wrapped into one output file that is then copied to the deploy directory.

pub mod code_generator;
pub mod config;
pub mod deadline;
pub mod deploy;
pub mod dirs;
pub mod error;
pub mod module_graph;
pub mod orchestrator;
pub mod requires;
pub mod resolver;
pub mod syntax;
