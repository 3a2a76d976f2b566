//! # N-dimensional event categorization.
//!
//! The [`CategoryRegistry`] classifies events and payloads into named
//! [`Category`] buckets. Categories live in independent dimensions, may form a
//! hierarchy, and are matched with regex patterns plus an optional async
//! validator.
//!
//! ```text
//! resolve(testable, strategy)
//!   ├─ first        → first validator-passing match in priority order
//!   ├─ specific     → best of matches scored count*1000 + priority
//!   ├─ all          → every pattern match, ranked
//!   └─ hierarchical → all, grouped under each match's topmost ancestor
//! ```

mod category;
mod registry;
mod resolve;

pub use category::{Category, CategoryOptions, CategoryPattern, Validator, DEFAULT_DIMENSION};
pub use registry::{CategoryDef, CategoryRegistry, RegistryStats};
pub use resolve::{CategoryMatch, CategoryTree, Resolution, ResolveContext, ResolveStrategy};
