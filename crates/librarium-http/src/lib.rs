//! # librarium-http
//!
//! The single HTTP surface every provider adapter goes through: a JSON
//! request/response client with retry (exponential backoff on 5xx/429 and
//! network errors), per-attempt timeout, a response-size cap, and prompt
//! external cancellation.
//!
//! Error statuses are **not** `Err` here: non-retryable 4xx come back
//! immediately and 5xx/429 come back once retries are exhausted, both as
//! ordinary [`HttpResponse`]s, so adapters can fold them into provider
//! results with service-specific guidance. Only transport-level failures
//! (network, timeout, abort, oversized body) surface as [`HttpError`].

#![deny(unsafe_code)]

pub mod client;

pub use client::{HttpClient, HttpError, HttpRequest, HttpResponse, MAX_RESPONSE_SIZE};
