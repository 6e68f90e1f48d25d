//! Outbound HTTP clients: the signed mail relay and the storefront's own
//! public API, including a cancellable cursor-paginated loader.

pub mod api;
pub mod paginated;
pub mod relay;

pub use api::{ClientError, StorefrontClient};
pub use paginated::{FetchError, PaginatedFetch, DEFAULT_CACHE_PAGES, DEFAULT_CACHE_TTL};
pub use relay::{sign_payload, verify_signature, MailKind, MailRelayClient, RelayError, RelayMessage};
