//! # uca-core
//!
//! Core types for the uca agent update engine.
//!
//! uca keeps a fixed catalog of third-party coding-agent CLIs up to date by
//! detecting how each one was installed and running the matching
//! package-manager command.
//!
//! ## Core Paradigm
//!
//! - An agent is static catalog data, never mutated during a run
//! - Strategies are tried in declared order, the first usable one wins
//! - Every selected agent ends with exactly one [`AgentResult`]
//! - A failing agent never aborts the run

mod catalog;
mod config;
mod error;
pub mod fail_open;
mod types;

pub use catalog::{default_agents, parse_list, select_agents, Selection};
pub use config::{ClassifierConfig, UcaConfig};
pub use error::{Result, UcaError};
pub use types::*;
