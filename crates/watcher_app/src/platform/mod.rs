mod app;
mod effects;
mod host;
pub mod logging;
pub mod settings;
mod site;

pub use app::{run_app, RunOptions};
