//! Storage abstractions for response persistence.
//!
//! The only persistent state the collector keeps is the response cache:
//!
//! ```text
//! {cache_dir}/
//! ├── http___api_ft_com_content_<id>        # success: raw response body
//! └── http___www_ft_com_cms_s_0_<id>_html   # empty: recorded failure
//! ```

pub mod cache;

// Re-export for convenience
pub use cache::{CacheEntry, ResponseCache};
