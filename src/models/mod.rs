//! Core data models for the asset hub.
//!
//! `StoredFile` is the metadata view shared by both storage backends. It maps
//! to the local `files` table via `sqlx::FromRow` and serializes as JSON via
//! `serde` for the HTTP surface.

pub mod stored_file;
