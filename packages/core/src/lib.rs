// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod alerts;
pub mod api;
pub mod directory;
pub mod error;
pub mod loans;
pub mod metrics;
pub mod scheduler;
pub mod store;

// These modules are only needed by the binary.
// Declared pub so integration tests can reach them if needed.
pub mod cli;
pub mod config;
pub mod logging;
