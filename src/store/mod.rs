//! Document storage and the version-keyed compilation state cache.
//!
//! URIs are opaque strings (`file://...`, `apexlib://...`). The store is
//! content-addressed by URI; the cache memoizes per-(uri, version)
//! compilation results and evicts superseded versions lazily on write.

use crate::diagnostics::Diagnostic;
use dashmap::DashMap;
use std::sync::Arc;

/// One open document. Text is shared, cloning is cheap.
#[derive(Debug, Clone)]
pub struct Document {
    text: Arc<str>,
    pub version: i32,
    pub language_id: String,
}

impl Document {
    pub fn new(text: impl Into<Arc<str>>, version: i32, language_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            version,
            language_id: language_id.into(),
        }
    }

    pub fn get_text(&self) -> &str {
        &self.text
    }
}

/// Content-addressed retrieval of source text by URI.
pub trait DocumentStore: Send + Sync {
    fn get_document(&self, uri: &str) -> Option<Document>;
    fn set_document(&self, uri: &str, document: Document);
    fn clear_file(&self, uri: &str);
    fn clear_all(&self);
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<String, Document>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get_document(&self, uri: &str) -> Option<Document> {
        self.documents.get(uri).map(|entry| entry.clone())
    }

    fn set_document(&self, uri: &str, document: Document) {
        self.documents.insert(uri.to_string(), document);
    }

    fn clear_file(&self, uri: &str) {
        self.documents.remove(uri);
    }

    fn clear_all(&self) {
        self.documents.clear();
    }
}

/// What one compilation of a document version produced, minus the symbol
/// table (that lives in the graph).
#[derive(Debug, Clone)]
pub struct CachedCompilation {
    pub version: i32,
    pub diagnostics: Vec<Diagnostic>,
    pub token_count: usize,
}

/// Per-URI memo of the latest compiled version. Writing a newer version
/// replaces the older entry, which is all the eviction this needs.
#[derive(Default)]
pub struct DocumentStateCache {
    entries: DashMap<String, CachedCompilation>,
}

impl DocumentStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit only when the cached entry matches `version` exactly.
    pub fn get(&self, uri: &str, version: i32) -> Option<CachedCompilation> {
        self.entries
            .get(uri)
            .filter(|entry| entry.version == version)
            .map(|entry| entry.clone())
    }

    pub fn put(&self, uri: &str, state: CachedCompilation) {
        // The read guard must drop before the insert touches the shard.
        let stale = self
            .entries
            .get(uri)
            .is_some_and(|existing| existing.version > state.version);
        if !stale {
            self.entries.insert(uri.to_string(), state);
        }
    }

    pub fn remove(&self, uri: &str) {
        self.entries.remove(uri);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::types::Range;

    #[test]
    fn store_round_trips_documents() {
        let store = InMemoryDocumentStore::new();
        store.set_document("file://a.cls", Document::new("public class A {}", 1, "apex"));

        let doc = store.get_document("file://a.cls").unwrap();
        assert_eq!(doc.get_text(), "public class A {}");
        assert_eq!(doc.version, 1);

        store.clear_file("file://a.cls");
        assert!(store.get_document("file://a.cls").is_none());
    }

    #[test]
    fn cache_is_version_exact() {
        let cache = DocumentStateCache::new();
        cache.put(
            "file://a.cls",
            CachedCompilation {
                version: 2,
                diagnostics: vec![Diagnostic::new(
                    Range::at(1, 0, 1, 1),
                    "m",
                    Severity::Error,
                    "SYNTAX_ERROR",
                )],
                token_count: 10,
            },
        );

        assert!(cache.get("file://a.cls", 2).is_some());
        assert!(cache.get("file://a.cls", 1).is_none());
        assert!(cache.get("file://a.cls", 3).is_none());
    }

    #[test]
    fn newer_version_evicts_older_and_stale_writes_lose() {
        let cache = DocumentStateCache::new();
        let state = |version| CachedCompilation {
            version,
            diagnostics: vec![],
            token_count: 0,
        };

        cache.put("file://a.cls", state(1));
        cache.put("file://a.cls", state(5));
        assert!(cache.get("file://a.cls", 1).is_none());
        assert!(cache.get("file://a.cls", 5).is_some());

        cache.put("file://a.cls", state(3));
        assert!(cache.get("file://a.cls", 5).is_some());
    }
}
