//! Schemascope - Database structure extraction and visualization
//!
//! Turns raw SQL into a structured description of tables, columns and
//! relationships, merges it into a persistent per-table store and lays the
//! result out as a left-to-right graph for rendering.

pub mod core;
