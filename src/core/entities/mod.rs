//! Entities module
//!
//! This module provides the REST API around the entity store:
//! - Schema extraction from a raw query
//! - List, merge-save, read and delete stored tables
//! - Graph layout of stored or posted schemas

pub mod api;

pub use api::{EntityApiState, entity_api_router};
