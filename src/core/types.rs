/*!
 * Core Types
 * Common types used across the supervisor
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry-assigned instance identifier (never reused)
pub type InstanceId = u64;

/// OS process ID
pub type Pid = i32;

/// Ordered `KEY=VALUE` environment entries supplied by a client
pub type Environment = Vec<String>;

/// Ways an instance can be referred to when it cannot be found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKey {
    Id(InstanceId),
    Pid(Pid),
    Name(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Id(id) => write!(f, "id {}", id),
            InstanceKey::Pid(pid) => write!(f, "pid {}", pid),
            InstanceKey::Name(name) => write!(f, "name \"{}\"", name),
        }
    }
}

/// Split a `KEY=VALUE` entry, rejecting entries without a key
pub fn split_env_entry(entry: &str) -> Option<(&str, &str)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Some((key, value)),
        _ => None,
    }
}
