//! Ruby Enterprise Edition installer library.
//!
//! This crate provides the build orchestration behind the `ree-installer`
//! binary: it probes the host, checks build dependencies with compile tests,
//! plans the platform-specific build steps, runs them in order and fixes up
//! the installed files. It can be driven programmatically for testing or for
//! custom installation workflows.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`context`] - Mutable state of one installation session
//! - [`deps`] - Build dependency catalog and compile-test probes
//! - [`error`] - Semantic error types with recovery hints
//! - [`exec`] - The process-spawning seam
//! - [`executor`] - Sequential step execution with idempotent skips
//! - [`fixup`] - Shebang rewriting and permission normalisation
//! - [`install_flow`] - The end-to-end installation session
//! - [`manifest`] - Distribution layout and package lists
//! - [`output`] - User-facing screens
//! - [`plan`] - Platform-conditioned build step planning
//! - [`platform`] - Host detection
//! - [`prefix`] - Prefix prompts, validation and the previous-prefix marker

pub mod cli;
pub mod context;
pub mod deps;
pub mod error;
pub mod exec;
pub mod executor;
pub mod fixup;
pub mod install_flow;
pub mod manifest;
pub mod output;
pub mod plan;
pub mod platform;
pub mod prefix;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
