pub mod auth;
pub mod client_address;

pub use auth::admin_auth;
pub use client_address::ClientAddress;
