// 4MiB Buffer size for streaming entry payloads
pub const BUFFER_SIZE: usize = 4 * 1024 * 1024;

// Body alignment used when the caller does not pick one
pub const DEFAULT_ALIGNMENT: u64 = 16;
