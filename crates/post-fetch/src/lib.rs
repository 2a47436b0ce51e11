//! Module source loading for Post.
//!
//! [`Fetcher`] produces raw source text for a module id:
//!
//! - local ids (`/pages/index.tsx`) are read from the source directory, with
//!   extension probing for extensionless ids and a size limit
//!   ([`TooLargeError`])
//! - remote ids (`https://...`) are fetched through an [`HttpClient`]; a
//!   non-success status is a [`FetchError`]
//!
//! [`Fetcher::load`] compares the new content hash with the previously
//! recorded one and reports [`Fetched::Unchanged`] on a match.
//!
//! [`UreqClient`] is the production client; [`MockHttpClient`] (behind the
//! `mock` feature) serves canned responses and counts requests.

mod client;
mod error;
mod fetcher;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use client::{HttpClient, HttpResponse, UreqClient};
pub use error::{FetchError, SourceError, TooLargeError};
pub use fetcher::{Fetched, Fetcher, Source};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockHttpClient;
