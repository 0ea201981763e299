pub mod config;
pub mod episode_core;
pub mod pipeline;
pub mod sqlite_pragma;
