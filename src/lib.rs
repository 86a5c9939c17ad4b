//! Authentication, session lifecycle, and ownership-based authorization
//! for a multi-tenant school administration system.

pub mod api;
pub mod auth;
pub mod authz;
pub mod cli;
