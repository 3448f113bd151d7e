//! Turnstile - Fixed-Window Rate Limiting
//!
//! This crate implements an in-process, fixed-window rate limiter keyed by
//! client identity, plus an HTTP surface that lets request handlers consult
//! it either over the wire or as axum middleware. State is held in memory
//! for the lifetime of the process and is never shared between processes.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
