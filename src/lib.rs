//! Data access for the AIX Admin membership records: members, the course
//! catalog, and which members take which courses.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod util;
pub mod validation;

pub use crate::config::Config;
pub use crate::db::Db;
pub use crate::error::{AdminError, AdminResult};
