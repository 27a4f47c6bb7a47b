//! Core domain models and business logic for schema extraction and storage

pub mod auto_layout;
pub mod fence;
pub mod linked;
pub mod merge;
mod schema;

pub mod ai_config;

#[cfg(feature = "server")]
pub mod ai_api;
#[cfg(feature = "server")]
pub mod config;
#[cfg(feature = "server")]
pub mod entities;
#[cfg(feature = "server")]
pub mod store;


pub use schema::*;
