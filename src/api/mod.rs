pub mod document;
pub mod stream;

pub use document::{encode_document, DocumentError, SUPPRESSED_FIELDS};
pub use stream::JsonArrayStream;
