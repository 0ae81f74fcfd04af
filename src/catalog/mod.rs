//! HTTP adapters for the two catalogs.

pub mod http;
pub mod spotify;
pub mod tidal;

pub use spotify::SpotifyCatalog;
pub use tidal::TidalCatalog;
