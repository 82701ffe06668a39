pub mod api;
pub mod server;

pub use api::AppState;
pub use server::{create_router, run_server};
