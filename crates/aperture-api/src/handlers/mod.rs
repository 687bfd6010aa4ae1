//! HTTP route handlers
//!
//! Handlers run after the surface chain has accepted the request, except for the sign-in
//! routes in [`login`], which only require an interactive connection.

pub mod login;
pub mod otlp;
pub mod session;
