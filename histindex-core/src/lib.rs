//! Core library for HistIndex, a research-note manager for quotes excerpted
//! from books, articles and primary sources.
//!
//! The primary entry point is [`Library`], which represents an open HistIndex
//! database file. All mutations go through `Library` methods; the generic
//! [`EntityManager`] and [`ComposedEntityManager`] underneath are public for
//! callers that need finer control over a connection or transaction.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    author::Author,
    book::Book,
    book_author::BookAuthor,
    composed::{ComposedEntity, ComposedEntityManager},
    entity::{Entity, EntityManager, MAX_WHERE_ELEMENTS},
    error::{HistIndexError, Result},
    export::{
        export_quotes, group_quotes, ExportContext, ExportError, ExportFormat, ExportedQuote,
        QuoteGroup, QuoteReport, SearchSummary, APP_VERSION, REPORT_VERSION,
    },
    keyword::Keyword,
    library::Library,
    quote::Quote,
    quote_keyword::QuoteKeyword,
    search::{compare_quotes, QuoteFilter, SearchQuery},
    source::Source,
    storage::Storage,
};
