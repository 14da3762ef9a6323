//! TourneyMail Storage - Database access for campaigns and their audiences
//!
//! This crate defines the persisted data model, one repository trait per
//! store, a PostgreSQL implementation of each, and an in-memory backend
//! implementing all of them.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
