//! HTTP façade and command-line glue for comfy-volume.

pub mod cli;
pub mod handlers;
pub mod server;
pub mod upstream;

pub use server::{router, start_server, AppState};
pub use upstream::UpstreamClient;
