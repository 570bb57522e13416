use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::cache::CachePolicy;
use crate::rate::Rate;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BASE_URL", default = "http://localhost:8080")]
    pub base_url: String,

    #[envconfig(default = "20000")]
    pub total_events: NonZeroUsize,

    #[envconfig(default = "0.3")]
    pub duplicate_rate: Rate,

    #[envconfig(default = "100")]
    pub batch_size: NonZeroUsize,

    #[envconfig(default = "1000")]
    pub cache_capacity: usize,

    #[envconfig(default = "fill_once")]
    pub cache_policy: CachePolicy,

    #[envconfig(default = "10")]
    pub virtual_users: NonZeroUsize,

    #[envconfig(default = "60000")]
    pub run_duration: EnvMsDuration,

    #[envconfig(default = "100")]
    pub pause_between_batches: EnvMsDuration,

    #[envconfig(default = "10000")]
    pub settle_delay: EnvMsDuration,

    #[envconfig(default = "30000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(default = "60000")]
    pub health_timeout: EnvMsDuration,

    #[envconfig(default = "2000")]
    pub health_poll_interval: EnvMsDuration,

    #[envconfig(default = "0.05")]
    pub rate_tolerance: Rate,

    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}
