//! Environment configuration (spec §6). No configuration framework — plain
//! `std::env` reads with `anyhow::Context`, matching `tinyzkp_api`'s
//! `std::env::var(...).ok().and_then(...)` style.

use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    GeoHash,
    GridBased,
}

impl Strategy {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "geo-hash" => Ok(Strategy::GeoHash),
            "grid-based" => Ok(Strategy::GridBased),
            other => anyhow::bail!("[config] unknown SEGMENTATION_STRATEGY {other:?}"),
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Strategy::GeoHash => "geohash_fixed_precision_7",
            Strategy::GridBased => "grid_region_growing",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub poll_interval: Duration,
    pub strategy: Strategy,
    pub port: u16,
    pub worker_count: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .context("[config] DATABASE_URL must be set")?;

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .ok()
            .map(|s| s.parse().context("[config] POLL_INTERVAL_MS must be an integer"))
            .transpose()?
            .unwrap_or(2_000);

        let strategy = std::env::var("SEGMENTATION_STRATEGY")
            .ok()
            .map(|s| Strategy::parse(&s))
            .transpose()?
            .unwrap_or(Strategy::GridBased);

        let port: u16 = std::env::var("PORT")
            .ok()
            .map(|s| s.parse().context("[config] PORT must be an integer"))
            .transpose()?
            .unwrap_or(8080);

        let worker_count: usize = std::env::var("WORKER_COUNT")
            .ok()
            .map(|s| s.parse().context("[config] WORKER_COUNT must be an integer"))
            .transpose()?
            .unwrap_or(1)
            .max(1);

        Ok(Config {
            database_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            strategy,
            port,
            worker_count,
        })
    }
}
