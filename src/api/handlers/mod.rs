//! API handlers for passkeep.
//!
//! `auth` holds the three account endpoints; `health` and `root` are the
//! operational routes.

pub mod auth;
pub mod health;
pub mod root;
