//! URL handling: normalization, authority extraction, and filtering
//!
//! URLs are normalized before they enter the scheduler so that equality
//! checks, deduplication, and the sitemap cache all agree on a canonical
//! form. The authority (host:port) is the unit of politeness.

mod authority;
mod filter;
mod normalize;

pub use authority::{authority, authority_of};
pub use filter::like_match;
pub use normalize::{normalize_url, surt_key};
