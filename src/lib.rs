//! Holmok: a personal photo site with signed-cookie sessions and cached reads.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod session;
