//! Error types for tool discovery and instance construction.

use std::fmt;
use thiserror::Error;

/// Why a single tool candidate was rejected during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateError {
    #[error("tool name is empty")]
    EmptyName,

    #[error("tool name contains unsupported characters (allowed: A-Z a-z 0-9 _ . -)")]
    InvalidName,

    #[error("another tool is already registered under this name")]
    DuplicateName,

    #[error("parameter schema must be a JSON object with \"type\": \"object\"")]
    NotAnObjectSchema,

    #[error("parameter schema does not compile: {0}")]
    SchemaCompile(String),
}

/// A rejected candidate together with the name it was offered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub name: String,
    pub error: CandidateError,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.name, self.error)
    }
}

/// Discovery failed; the registry was not built.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("failed to load tools from source '{source_name}': {message}")]
    Load {
        source_name: String,
        message: String,
    },

    #[error(
        "{} tool candidate(s) from '{source_name}' rejected: {}",
        failures.len(),
        join_failures(failures)
    )]
    Rejected {
        source_name: String,
        failures: Vec<CandidateFailure>,
    },
}

fn join_failures(failures: &[CandidateFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Building the shared (server, transport) pair failed.
///
/// Handed to every caller awaiting the same construction.
#[derive(Debug, Clone, Error)]
pub enum InstanceError {
    #[error("tool discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("instance construction task failed: {0}")]
    Task(String),
}
