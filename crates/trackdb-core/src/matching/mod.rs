//! Name normalization, alias resolution and column matching.

pub mod alias;
pub mod matcher;
pub mod normalize;

pub use alias::{AliasRegistry, DEFAULT_ALIASES};
pub use matcher::{
    ColumnMapping, ColumnMatch, ColumnMatcher, MatchMethod, MatchStrategy, SchemaMapping,
};
pub use normalize::normalize;
