pub mod source;
pub mod target;

pub use source::SourceCatalog;
pub use target::TargetCatalog;

#[cfg(test)]
pub use source::MockSourceCatalog;
#[cfg(test)]
pub use target::MockTargetCatalog;
