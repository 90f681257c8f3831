#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Lockfile conversion core.
//!
//! Reads npm and yarn lockfiles into a dialect-neutral [`pkg::Snapshot`],
//! resolves it into a dependency graph, projects that graph onto a hoisted
//! `node_modules` layout and writes it back out in any supported dialect.

pub mod config;
pub mod error;
pub mod pkg;
pub mod version;

pub use config::{Config, FormatOptions};
pub use error::{Error, Result};
pub use version::VERSION;
