pub mod db;
mod dispatches;
mod files;
pub(crate) mod links;
pub mod models;
mod tables;

pub use db::{Database, DatabaseError};
pub use links::LinkTally;
pub use tables::*;
