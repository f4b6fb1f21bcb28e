pub mod config;
pub mod scheduler;
mod server;

pub use server::{build_router, AppState};
