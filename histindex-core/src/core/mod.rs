//! Internal domain modules for the HistIndex core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod author;
pub mod book;
pub mod book_author;
pub mod composed;
pub mod entity;
pub mod error;
pub mod export;
pub mod keyword;
pub mod library;
pub mod quote;
pub mod quote_keyword;
pub mod search;
pub mod source;
pub mod storage;

#[doc(inline)]
pub use author::Author;
#[doc(inline)]
pub use book::Book;
#[doc(inline)]
pub use book_author::BookAuthor;
#[doc(inline)]
pub use composed::{ComposedEntity, ComposedEntityManager};
#[doc(inline)]
pub use entity::{Entity, EntityManager};
#[doc(inline)]
pub use error::{HistIndexError, Result};
#[doc(inline)]
pub use export::{export_quotes, ExportContext, ExportError, ExportFormat, SearchSummary};
#[doc(inline)]
pub use keyword::Keyword;
#[doc(inline)]
pub use library::Library;
#[doc(inline)]
pub use quote::Quote;
#[doc(inline)]
pub use quote_keyword::QuoteKeyword;
#[doc(inline)]
pub use search::{QuoteFilter, SearchQuery};
#[doc(inline)]
pub use source::Source;
#[doc(inline)]
pub use storage::Storage;
