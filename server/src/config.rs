use clap::Parser;
use std::env;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "zaku-server",
    about = "Networked task-queue and pub/sub server"
)]
pub struct Config {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    #[arg(long)]
    pub verbose: bool,

    /// If the target port is already bound, probe once and exit non-zero
    /// rather than signal an unrelated process.
    #[arg(long)]
    pub free_port: bool,

    #[arg(long, env = "ZAKU_REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "ZAKU_KEY_PREFIX", default_value = "zaku")]
    pub key_prefix: String,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn auth_from_env(&self) -> crate::auth::AuthConfig {
        match (env::var("ZAKU_USER"), env::var("ZAKU_KEY")) {
            (Ok(user), Ok(key)) => crate::auth::AuthConfig::shared_secret(user, key),
            _ => crate::auth::AuthConfig::disabled(),
        }
    }
}
