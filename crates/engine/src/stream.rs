//! Lazy result streams

use crate::cache::MetadataCache;
use docshape_core::{
    to_resource_instance, Document, Metadata, MetadataConfig, ResourceInstance, Result,
};
use docshape_query::CompiledProjection;
use docshape_storage::DocumentCursor;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Where streamed documents are folded when dynamic discovery is on
#[derive(Debug, Clone)]
pub(crate) struct Discovery {
    pub(crate) cache: Arc<MetadataCache>,
    pub(crate) identity: String,
    pub(crate) config: MetadataConfig,
}

/// Single-pass stream of resource instances for one executed query
///
/// Documents are converted as they are pulled from the store cursor. To read
/// the results again, execute the query again.
pub struct ResourceStream {
    cursor: DocumentCursor,
    collection: String,
    metadata: Arc<Metadata>,
    projection: Option<CompiledProjection>,
    discovery: Option<Discovery>,
    read: usize,
}

impl ResourceStream {
    pub(crate) fn new(
        cursor: DocumentCursor,
        collection: impl Into<String>,
        metadata: Arc<Metadata>,
        projection: Option<CompiledProjection>,
        discovery: Option<Discovery>,
    ) -> Self {
        ResourceStream {
            cursor,
            collection: collection.into(),
            metadata,
            projection,
            discovery,
            read: 0,
        }
    }

    /// Set the stream reads from
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Documents pulled from the store so far
    pub fn documents_read(&self) -> usize {
        self.read
    }

    fn convert(&mut self, document: Document) -> Result<ResourceInstance> {
        if let Some(discovery) = &self.discovery {
            let latest = discovery.cache.fold(
                &discovery.identity,
                &discovery.config,
                &self.collection,
                std::slice::from_ref(&document),
            )?;
            if let Some(latest) = latest {
                self.metadata = latest;
            }
        }
        let instance = to_resource_instance(&document, &self.metadata, &self.collection)?;
        match &self.projection {
            Some(projection) => projection.apply(&instance),
            None => Ok(instance),
        }
    }
}

impl Iterator for ResourceStream {
    type Item = Result<ResourceInstance>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = match self.cursor.next() {
            Some(Ok(document)) => document,
            Some(Err(e)) => return Some(Err(e)),
            None => {
                debug!(
                    target: "docshape::query",
                    set = %self.collection,
                    read = self.read,
                    "Stream exhausted"
                );
                return None;
            }
        };
        self.read += 1;
        Some(self.convert(document))
    }
}

impl fmt::Debug for ResourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStream")
            .field("collection", &self.collection)
            .field("projected", &self.projection.is_some())
            .field("dynamic", &self.discovery.is_some())
            .field("read", &self.read)
            .finish()
    }
}
