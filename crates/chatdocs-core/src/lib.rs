pub mod config_manager;
pub mod error;
pub mod extract;
pub mod logging;
pub mod retry;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use extract::*;
pub use logging::init_tracing;
pub use retry::RetryPolicy;
pub use types::*;
