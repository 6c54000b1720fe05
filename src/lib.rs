pub mod error;
pub mod types;

pub mod autosave;
pub mod context;
pub mod convert;
pub mod merge;
pub mod optimistic;
pub mod patch;
pub mod service;
pub mod store;
pub mod trash;
