//! Wire types and configuration shared by the MyFacebook auth server.

pub mod config;
pub mod types;
