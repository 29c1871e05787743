pub mod archive;
pub mod commands;
pub mod compat;
pub mod error;
pub mod framework;
pub mod hash;
pub mod index;
pub mod package;
pub mod protocol;
pub mod query;
pub mod runtime;
pub mod service;
pub mod settings;
pub mod storage;
pub mod version;
pub mod watch;

pub use error::{FeedError, Result};
