//! # librarium-core
//!
//! Foundation types and pure logic for the librarium research runner.
//!
//! This crate provides the shared vocabulary that all other librarium crates
//! depend on:
//!
//! - **Records**: [`ProviderDescriptor`], [`ProviderResponse`], [`Citation`],
//!   [`AsyncTaskHandle`], [`ProviderReport`], [`RunManifest`]
//! - **Normalization**: URL canonicalization and cross-provider citation
//!   deduplication ([`normalize`])
//! - **Retry math**: backoff constants and delay calculation ([`retry`])
//! - **Text utilities**: slug derivation, id sanitization, word counts
//!   ([`text`])
//!
//! Everything here is pure and sync; network and filesystem concerns live in
//! the crates layered on top.

#![deny(unsafe_code)]

pub mod ids;
pub mod normalize;
pub mod retry;
pub mod text;
pub mod types;

pub use normalize::{dedup_citations, normalize_url};
pub use types::{
    AsyncTaskHandle, Capabilities, Citation, DedupedSource, DispatchMode, ProviderDescriptor,
    ProviderReport, ProviderResponse, ProviderSource, ProviderTier, ReportStatus, RunManifest,
    SourcesSummary, TaskStatus, TokenUsage,
};
