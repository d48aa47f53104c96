#![doc = "apt-repo-core: synchronisation and publishing engine for apt-repo."]

//! This crate holds the business logic of apt-repo: resolving where each
//! release artifact is published, tracking which releases were already
//! mirrored, and orchestrating download and publish across projects.
//! Talking to GitHub and spawning freight live in the `apt-repo` crate,
//! behind the traits in [`contract`].
//!
//! # Usage
//! Build a [`synchronise::SynchroniseConfig`], provide implementations of
//! the [`contract`] traits and call [`synchronise::run`].

pub mod config;
pub mod contract;
pub mod download;
pub mod error;
pub mod publish;
pub mod state;
pub mod synchronise;
