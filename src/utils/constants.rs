pub const PREFIX_QUEUE: &str = "snm:queue";
pub const PREFIX_META: &str = "snm:meta";
pub const QUEUES_KEY: &str = "snm:queues";
pub const DEAD_JOBS_KEY: &str = "snm:dead_jobs";

/// Metadata lives this long after the reference event unless a job overrides it.
pub const DEFAULT_EXPIRE_META_IN: u64 = 24 * 60 * 60;

/// Latest expiry ever written: 9999-12-31T23:59:59Z. Larger values overflow
/// Redis' millisecond expiry.
pub const MAX_EXPIRE_AT: i64 = 253_402_300_799;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
