pub mod core;
pub mod index;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod server;
pub mod session;
pub mod state;
