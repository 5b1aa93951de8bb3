//! SQLite persistence on a dedicated worker thread.
//!
//! Each repository module adds `impl Database` methods for one table; all of
//! them go through [`Database::execute`].

mod connection;
pub mod helpers;
mod migrations;
pub mod repositories;

pub use connection::Database;
pub use repositories::{reviews::LabelWrite, training_jobs::JobClaim};
