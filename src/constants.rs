//! Shared defaults and well-known names.

/// Partition count used when no configuration overrides it
pub const DEFAULT_PARTITION_COUNT: u32 = 257;

/// Byte budget for one scatter-gather round trip (512KB)
pub const DEFAULT_TRANSFER_THRESHOLD: u64 = 524_288;

/// Separator between executor id and task id in assignment keys
pub const ASSIGNMENT_KEY_SEPARATOR: char = ':';

pub const DEFAULT_TASK_MAP_NAME: &str = "executor-tasks";
pub const DEFAULT_ASSIGNMENT_MAP_NAME: &str = "executor-assignments";

pub const DEFAULT_MEMBER_NAME: &str = "grid-member";
pub const DEFAULT_LISTENER_EXECUTOR_NAME: &str = "task-coordinator";

/// Named cookie formats understood by [`crate::partition::CookieCodecs`]
pub mod cookie_formats {
    pub const BINARY: &str = "binary";
    pub const BASE64: &str = "base64";

    pub const ALL: &[&str] = &[BINARY, BASE64];
}

/// Environment variables read by the config loader and logging setup
pub mod env {
    pub const CONFIG_PATH: &str = "GRID_CONFIG_PATH";
    pub const ENVIRONMENT: &str = "GRID_ENV";
    pub const ENV_PREFIX: &str = "GRID";
}
