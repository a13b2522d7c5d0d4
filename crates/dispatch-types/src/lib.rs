//! Shared type definitions for the dispatch system.
//!
//! This crate provides the domain types used across all dispatch
//! service crates: bookings and their lifecycle states, providers,
//! audit history, events, and the HTTP API request/response bodies.

pub mod api;
pub mod booking;
pub mod events;
pub mod provider;

pub use api::*;
pub use booking::*;
pub use events::*;
pub use provider::*;
