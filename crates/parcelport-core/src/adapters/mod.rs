//! Concrete carrier adapters.

mod canonical;

pub use canonical::CanonicalHttpAdapter;
