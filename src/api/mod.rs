//! API response types, pagination and shared extractors

pub mod extract;
pub mod pagination;
pub mod response;

pub use extract::ValidatedJson;
pub use pagination::{Paginated, PaginationParams};
pub use response::{Created, DataResponse, NoContent};
