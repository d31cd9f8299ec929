//! Snowflake identifiers for rule executions.
//!
//! Every run of the executor is tagged with an execution id so that log lines
//! of one run can be correlated.

use snowflake::SnowflakeIdBucket;
use std::sync::{Mutex, MutexGuard};

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

fn generator() -> MutexGuard<'static, Option<SnowflakeIdBucket>> {
    ID_GENERATOR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Configure the generator. `machine_id` and `node_id` must be in `0..=31`.
pub fn init(machine_id: i32, node_id: i32) {
    *generator() = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Next execution id as a decimal string. Lazily initializes with `(1, 1)`.
pub fn next_execution_id() -> String {
    let mut gen = generator();
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}
