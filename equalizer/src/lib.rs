mod backend_selection;
mod common;
pub mod compute;
mod config;
mod image;
mod pipeline;
mod tables;

pub mod prelude;

pub use prelude::*;
