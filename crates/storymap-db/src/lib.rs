//! Durable storage for story-map planning graphs.
//!
//! Holds the entity rows shared by every layer ([`models`]), connection and
//! migration helpers ([`pool`]), and one query module per table
//! ([`queries`]).

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
