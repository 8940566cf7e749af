pub mod manifest;
pub mod loaders;
pub mod events;
pub mod output;
pub mod commands;
