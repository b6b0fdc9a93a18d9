//! `plantlog` - Role-based plant observation tracking
//!
//! Students record growth observations for the plants their teachers assign
//! them; the [`stats`] module turns those records into summaries and
//! correlations. Everything that talks to a store goes through the
//! [`backend`] traits, with [`storage::LocalBackend`] and
//! [`storage::FsBlobs`] as the bundled implementation and [`api`] as the
//! HTTP surface.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod stats;
pub mod storage;

pub use backend::Backend;
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use storage::{Storage, StorageStats};
