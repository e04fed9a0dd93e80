//! Binary configuration. Every setting is overridable from the environment,
//! matching the `#[arg(env = "...")]` clap idiom used elsewhere in this
//! workspace's CLI tooling.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "ihpa-controller", about = "Intelligent horizontal pod autoscaler controller")]
pub struct Config {
    /// Address the `/metrics` and `/health` server binds to.
    #[arg(long, env = "IHPA_METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: String,

    /// Log format: "pretty" for local development, "json" for production.
    #[arg(long, env = "IHPA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Tracing filter directive, e.g. "info" or "ihpa_controller=debug,info".
    #[arg(long, env = "IHPA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Capacity of the estimator manager's command channel.
    #[arg(long, env = "IHPA_MANAGER_COMMAND_CAPACITY", default_value_t = ihpa_core::manager::DEFAULT_COMMAND_CAPACITY)]
    pub manager_command_capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}
