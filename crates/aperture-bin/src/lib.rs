//! # Aperture Server Library
//!
//! Startup helpers shared by the `aperture` binary and its tests.

pub mod options_loader;
