//! Value types shared between the client and the queue

mod error;
mod request;
mod response;

pub use error::ErrorKind;
pub use request::{Callback, Request, RequestParams};
pub use response::SearchResponse;

/// The main result type of this crate
pub type Result<T> = std::result::Result<T, ErrorKind>;
