//! Document store contract
//!
//! The resource layer never talks to a concrete backend: metadata inference,
//! query execution and change replay all go through `DocumentStore`.

use crate::query::{NativeQuery, ScanOrder};
use docshape_core::{Document, NativeValue, Result};

/// Lazily produced sequence of documents
///
/// Owns whatever it reads from so it can outlive the call that created it.
pub type DocumentCursor = Box<dyn Iterator<Item = Result<Document>> + Send>;

/// Native document store
///
/// Implementations report backend failures as `Error::StoreOperationFailed`.
/// Must be `Send + Sync`; one store is shared by every consumer of a provider.
pub trait DocumentStore: Send + Sync {
    /// Stable identity of the connection (server + database)
    ///
    /// Metadata is cached per identity.
    fn identity(&self) -> &str;

    /// Names of all collections
    fn collection_names(&self) -> Result<Vec<String>>;

    /// Documents of a collection in natural order, at most `limit`
    fn scan(&self, collection: &str, order: ScanOrder, limit: Option<usize>)
        -> Result<DocumentCursor>;

    /// Execute a native query
    fn execute(&self, query: &NativeQuery) -> Result<DocumentCursor>;

    /// Count documents matching a query (skip and limit applied)
    fn count(&self, query: &NativeQuery) -> Result<u64>;

    /// Insert a document, returning its identifier
    ///
    /// A document without `_id` is assigned a new object id.
    fn insert(&self, collection: &str, document: Document) -> Result<NativeValue>;

    /// Set and unset top-level fields of the document with the given id
    ///
    /// Returns the number of matched documents.
    fn update(
        &self,
        collection: &str,
        id: &NativeValue,
        set: Document,
        unset: Vec<String>,
    ) -> Result<u64>;

    /// Delete the document with the given id, returning the number removed
    fn delete(&self, collection: &str, id: &NativeValue) -> Result<u64>;
}
