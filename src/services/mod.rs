pub mod conversion;
pub mod errors;
pub mod format;
pub mod rate_limiter;
pub mod storage;
pub mod transcoder;
pub mod upload_service;
pub mod worker;
