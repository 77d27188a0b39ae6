pub mod form;
pub mod headers;
pub mod json_response;

// Re-export commonly used utilities
pub use form::*;
pub use headers::*;
pub use json_response::*;
