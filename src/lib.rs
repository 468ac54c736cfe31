//! Adoption Functions - rate-limited pet adoption HTTP functions
//!
//! This crate hosts serverless-style handlers for browsing adoptable pets and
//! managing a user's favorites. Every handler is wrapped by a per-client
//! fixed-window rate limiter whose counters live in a shared in-memory store
//! that a background reaper keeps bounded.

pub mod backend;
pub mod config;
pub mod error;
pub mod function;
pub mod handlers;
pub mod ratelimit;
pub mod server;
