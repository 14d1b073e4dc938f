pub mod audio;
pub mod backend;
pub mod classify;
pub mod command;
pub mod config;
pub mod confirm;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod output;
pub mod preview;
pub mod rate_limit;
pub mod runner;
pub mod server;
pub mod video;

pub use backend::{Backends, DefaultBackends};
pub use config::Config;
pub use error::RunnerError;
pub use events::EventHub;
pub use output::OutputRouter;
pub use rate_limit::Cooldown;
pub use runner::{ConfigSource, LifecycleState, Runner};
pub use server::ControlServer;
