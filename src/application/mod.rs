//! Application services: cached reads, invalidating writes and login.

pub mod categories;
pub mod error;
pub mod photos;
pub mod repos;
pub mod users;
