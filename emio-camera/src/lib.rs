mod config;
pub use config::*;
mod error;
pub use error::*;
mod harness;
pub use harness::*;
mod in_process;
pub use in_process::*;
mod pipeline;
pub use pipeline::*;
mod registry;
pub use registry::*;
mod session;
mod state;
pub use state::*;
pub mod synthetic;
mod tracker;
pub use tracker::*;
mod worker;
pub use worker::*;
