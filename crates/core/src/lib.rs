//! Domain records, payload validation and pagination shared by the storefront
//! service, its storage layer and its HTTP clients.

pub mod page_cache;
pub mod pagination;
pub mod types;
pub mod validation;

pub use page_cache::PageCache;
pub use pagination::{Page, PageRequest, PaginationError, SortOrder};
pub use types::{Collection, DocumentId, IdGenerator, InvalidId, Stored, Summarize, Summary};
pub use validation::ValidationError;
