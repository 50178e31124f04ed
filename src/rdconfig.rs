// src/rdconfig.rs
use redis::{aio::MultiplexedConnection, Client};
use tracing::debug;

pub async fn get_redis_conn(redis_url: &str) -> redis::RedisResult<MultiplexedConnection> {
    // Client::open will auto-handle rediss:// if TLS feature is enabled
    let client = Client::open(redis_url)?;
    let conn = client.get_multiplexed_async_connection().await?;
    debug!(redis_url, "Redis connection established");
    Ok(conn)
}
