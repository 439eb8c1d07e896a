pub mod cancel;
pub mod config;
pub mod error;

pub use cancel::{run_cancellable, sleep_cancellable};
pub use config::Config;
pub use error::{Error, HttpError, Result};
