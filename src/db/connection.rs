use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;

// One linkage statement runs at a time; the pool mostly serves schema
// probes and the seeding tool.
const DEFAULT_MAX_CONNS: u32 = 8;

pub async fn make_pool(cfg: &DatabaseConfig) -> Result<MySqlPool> {
    make_pool_with_size(cfg, None).await
}

pub async fn make_pool_with_size(cfg: &DatabaseConfig, max: Option<u32>) -> Result<MySqlPool> {
    let url = cfg.to_url();
    let max_conn: u32 = if let Some(m) = max {
        m
    } else if let Ok(s) = std::env::var("RECORD_LINKER_POOL_SIZE") {
        match s.parse::<u32>() {
            Ok(v) if v > 0 => v,
            _ => {
                log::warn!("Invalid RECORD_LINKER_POOL_SIZE='{}'; using default", s);
                DEFAULT_MAX_CONNS
            }
        }
    } else {
        DEFAULT_MAX_CONNS
    };
    let max_conn = if max_conn == 0 { DEFAULT_MAX_CONNS } else { max_conn };
    let min_conn: u32 = std::env::var("RECORD_LINKER_POOL_MIN")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2);
    let acquire_ms: u64 = std::env::var("RECORD_LINKER_ACQUIRE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30_000);
    let idle_ms: u64 = std::env::var("RECORD_LINKER_IDLE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30_000);
    let life_ms: u64 = std::env::var("RECORD_LINKER_LIFETIME_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(600_000);

    log::debug!(
        "MySQL pool: max={} min={} acquire={}ms idle={}ms lifetime={}ms",
        max_conn,
        min_conn.min(max_conn),
        acquire_ms,
        idle_ms,
        life_ms
    );
    let pool = MySqlPoolOptions::new()
        .max_connections(max_conn)
        .min_connections(min_conn.min(max_conn))
        .acquire_timeout(Duration::from_millis(acquire_ms))
        .idle_timeout(Some(Duration::from_millis(idle_ms)))
        .max_lifetime(Some(Duration::from_millis(life_ms)))
        .connect(&url)
        .await?;
    Ok(pool)
}
