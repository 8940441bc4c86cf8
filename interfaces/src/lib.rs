pub mod defs;

pub use defs::{ExistingPost, NewPost, PageSnapshot, ResponseHeaders, SiteReport, StructuredData, Suggestion};
