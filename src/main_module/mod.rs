mod health;
mod server;

pub use health::health_check;
pub use server::run_server;
