pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod handler;
pub mod state;
