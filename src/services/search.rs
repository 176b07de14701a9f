use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One retrievable passage of an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub content: String,
    pub source: String,
}

/// In-process document store injected into the turn orchestrator. Reads are
/// concurrent, writes append-only and serialized behind the lock. Scoring is
/// lexical token overlap; an embedding-backed store can replace this behind
/// the same interface.
pub struct DocumentStore {
    documents: RwLock<Vec<StoredDocument>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_documents(&self, documents: Vec<StoredDocument>) {
        if documents.is_empty() {
            return;
        }
        let mut store = self.documents.write().await;
        store.extend(documents);
    }

    pub async fn similarity_search(&self, query: &str, k: usize) -> Vec<StoredDocument> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let store = self.documents.read().await;
        let mut scored: Vec<(usize, usize, &StoredDocument)> = store
            .iter()
            .enumerate()
            .filter_map(|(idx, doc)| {
                let score = overlap_score(&query_tokens, &doc.content);
                if score > 0 {
                    Some((score, idx, doc))
                } else {
                    None
                }
            })
            .collect();

        // Highest score first; insertion order breaks ties deterministically.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(k)
            .map(|(_, _, doc)| doc.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

fn overlap_score(query_tokens: &HashSet<String>, content: &str) -> usize {
    let doc_tokens = tokenize(content);
    query_tokens.intersection(&doc_tokens).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> StoredDocument {
        StoredDocument {
            content: content.to_string(),
            source: "test.txt".to_string(),
        }
    }

    #[test]
    fn search_ranks_by_token_overlap() {
        tokio_test::block_on(async {
            let store = DocumentStore::new();
            store
                .add_documents(vec![
                    doc("Quarterly sales figures for the Lisbon office"),
                    doc("Employee onboarding checklist"),
                    doc("Sales targets and revenue projections"),
                ])
                .await;

            let results = store.similarity_search("sales revenue", 2).await;
            assert_eq!(results.len(), 2);
            assert_eq!(results[0].content, "Sales targets and revenue projections");
        });
    }

    #[test]
    fn unrelated_query_returns_nothing() {
        tokio_test::block_on(async {
            let store = DocumentStore::new();
            store.add_documents(vec![doc("Quarterly sales figures")]).await;

            let results = store.similarity_search("gardening tips", 2).await;
            assert!(results.is_empty());
        });
    }

    #[test]
    fn empty_store_returns_nothing() {
        tokio_test::block_on(async {
            let store = DocumentStore::new();
            assert!(store.similarity_search("anything", 2).await.is_empty());
        });
    }

    #[test]
    fn clear_empties_the_store() {
        tokio_test::block_on(async {
            let store = DocumentStore::new();
            store.add_documents(vec![doc("some content")]).await;
            assert_eq!(store.len().await, 1);

            store.clear().await;
            assert_eq!(store.len().await, 0);
        });
    }
}
