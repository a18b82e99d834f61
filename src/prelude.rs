pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_PARTIAL_CONTENT: u16 = 206;
pub const HTTP_FOUND: u16 = 302;
pub const HTTP_NOT_MODIFIED: u16 = 304;
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_UNAUTHORIZED: u16 = 401;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_CONFLICT: u16 = 409;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;
pub const HTTP_RANGE_NOT_SATISFIABLE: u16 = 416;
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;

pub const READ_BUF_SIZE: usize = 4096;
pub const MAX_READ_DATA: usize = u16::MAX as usize; // 64KB input buffer capacity
pub const _1MB: usize = 1_024 * 1024;

pub const WHEEL_SLOTS: usize = 256;
pub const WHEEL_TICK_MS: u64 = 100;

/// Worker count for a server block's `TaskPool` when `use_thread_pool` is set.
pub const TASK_POOL_SIZE: usize = 4;
