//! Side-effecting helpers: model data, catalog files, solver processes, storage.

pub mod catalog;
pub mod config;
pub mod dirs;
pub mod finalize;
pub mod model_data;
pub mod pipeline;
pub mod prepare;
pub mod process;
pub mod run_store;
pub mod solver;
pub mod strategy;
pub mod table;
