//! Utility functions shared by the fetcher and the command-line front end.
//!
//! - **URL validation**: scheme checks plus optional rejection of local and
//!   private-network hosts

mod url_validator;

pub use url_validator::{validate_url, UrlPolicy, UrlValidationError};
