//! GoTicket Server - Event ticketing API.
//!
//! This crate provides the HTTP backend of GoTicket, responsible for:
//! - Account signup and sign-in through the Supabase identity service
//! - Event listing, creation and organizer-only updates
//! - Event registrations with capacity checks
//!
//! # Architecture
//!
//! The server is a thin layer in front of Supabase. Requests pass through a
//! per-route middleware [`middleware::Pipeline`] (CORS, per-client rate
//! limiting, bearer token presence) before reaching a handler in [`routes`],
//! which forwards the caller's token to Supabase so row-level security
//! decides what the caller may read or write. The only state held in
//! process is the rate limiter's request log.

pub mod config;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod supabase;
pub mod types;
pub mod validation;
