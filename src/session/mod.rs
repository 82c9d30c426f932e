pub mod auth;
pub mod csrf;
pub mod identity;

pub use csrf::{CsrfExtractor, TokenExtractor};
pub use identity::Identity;
