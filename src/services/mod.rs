//! Service layer modules for external integrations.
//!
//! Contains clients for Redis caching, Supabase Storage, the image proxy,
//! machine translation and geocoding.

pub mod cache;
pub mod geocoder;
pub mod image_proxy;
pub mod storage;
pub mod translator;

pub use cache::RedisCache;
pub use geocoder::GeocoderClient;
pub use image_proxy::ImageProxy;
pub use storage::StorageClient;
pub use translator::TranslatorClient;
