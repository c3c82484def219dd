//! Database models split into domain-specific modules.
//!
//! Everything is re-exported so callers can use `crate::db::Book` etc.

pub mod book;
pub mod category;
pub mod common;
pub mod order;
pub mod user;
pub mod video;

pub use book::*;
pub use category::*;
pub use common::*;
pub use order::*;
pub use user::*;
pub use video::*;
