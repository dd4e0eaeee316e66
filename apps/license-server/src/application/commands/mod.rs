pub mod accounts;
pub mod client;
pub mod keys;
pub mod login;
