//! Asynchronous loading of volume sources

pub mod loader;

pub use loader::{LoadState, SourceLoader};
