pub mod access_log;
pub mod account;
pub mod license;
pub mod presence;
