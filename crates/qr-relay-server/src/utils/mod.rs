pub mod cookies;
pub mod error;
pub mod logger;
pub mod url;

pub use cookies::CookieMap;
pub use error::RelayError;
