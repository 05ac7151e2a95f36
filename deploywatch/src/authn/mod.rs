//! Credential access

pub mod credentials;
