//! Atlas Installer - resumable download and extraction of large archives.
//!
//! This library provides the core of the Atlas Interactivo installer: it
//! fetches a multi-gigabyte archive from a remote source, unpacks it with an
//! external archive tool, and records the installation so repeated runs are
//! idempotent. Presentation layers (the bundled CLI, or any GUI) drive it
//! through [`installer::Installer`] and observe it through
//! [`installer::InstallEvent`]s.

pub mod config;
pub mod installer;
pub mod logging;

/// Version of the installer library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
