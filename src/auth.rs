//! Credential models: redacted secrets, the access/refresh pair, and unverified JWT claims.

pub mod claims;
pub mod credentials;
pub mod secret;

pub use claims::*;
pub use credentials::*;
pub use secret::*;
