//! Content hashing and on-disk artifact cache for Post.
//!
//! - [`content_hash`] / [`hash_prefix`]: stable SHA-1 content hashes used both
//!   for change detection and for content-addressed artifact names
//! - [`ArtifactStore`]: the `.cache` directory holding module metadata,
//!   compiled artifacts and source maps
//!
//! # Example
//!
//! ```
//! use post_cache::{content_hash, hash_prefix};
//!
//! let hash = content_hash("export default 1;");
//! assert_eq!(hash.len(), 40);
//! assert_eq!(hash_prefix(&hash).len(), 9);
//! ```

mod hash;
mod store;

pub use hash::{HASH_PREFIX_LEN, content_hash, hash_prefix};
pub use store::ArtifactStore;
