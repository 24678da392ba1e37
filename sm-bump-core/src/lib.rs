#![doc = "sm-bump-core: pipeline library for syncing mozjs with upstream SpiderMonkey releases."]

//! Resolves the latest upstream ESR release tag, finds the CI tasks that packaged it,
//! downloads their artifacts, republishes them as a changeset-keyed release, then
//! re-downloads the canonical archive, applies the local patch series and commits.
//!
//! # Usage
//! Build a [`synchronise::Collaborators`] from concrete clients (or the exported mocks)
//! and call [`synchronise::synchronise`]. The CLI crate wires the real ones.

pub mod command;
pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod git;
pub mod locate;
pub mod patch;
pub mod publish;
pub mod resolve;
pub mod state;
pub mod synchronise;
pub mod upstream;

pub use error::{ArtifactMiss, SyncError};
