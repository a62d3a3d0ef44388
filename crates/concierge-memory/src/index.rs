//! Tantivy relevance index over stored memories

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tantivy::{
    collector::TopDocs,
    query::{BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::*,
    Index, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use tracing::{debug, info};

/// A ranked memory snippet returned from search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,
    pub score: f32,
}

/// Tantivy index wrapper, scoped per user at query time
pub struct MemoryIndex {
    index: Index,
    id_field: Field,
    user_field: Field,
    content_field: Field,
}

impl MemoryIndex {
    /// Create or open the index at the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Initializing memory index at {:?}", path.as_ref());

        std::fs::create_dir_all(path.as_ref())?;

        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let user_field = schema_builder.add_text_field("user_id", STRING | STORED);
        let content_field = schema_builder.add_text_field("content", TEXT | STORED);
        let schema = schema_builder.build();

        let index = if path.as_ref().join("meta.json").exists() {
            Index::open_in_dir(path.as_ref())?
        } else {
            Index::create_in_dir(path.as_ref(), schema)?
        };

        Ok(Self {
            index,
            id_field,
            user_field,
            content_field,
        })
    }

    /// Index a memory document
    pub fn index_memory(&self, id: &str, user_id: &str, content: &str) -> Result<()> {
        let mut writer = self.get_writer()?;

        let mut doc = TantivyDocument::default();
        doc.add_text(self.id_field, id);
        doc.add_text(self.user_field, user_id);
        doc.add_text(self.content_field, content);

        writer.add_document(doc)?;
        writer.commit()?;

        debug!("Indexed memory {} for user {}", id, user_id);
        Ok(())
    }

    /// Search a user's memories, most relevant first
    pub fn search(&self, user_id: &str, query_str: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let searcher = reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        // Lenient parse: chat text routinely contains characters the query
        // syntax would otherwise reject
        let (content_query, _errors) = query_parser.parse_query_lenient(query_str);

        let user_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.user_field, user_id),
            IndexRecordOption::Basic,
        ));
        let query = BooleanQuery::new(vec![
            (Occur::Must, user_query),
            (Occur::Must, content_query),
        ]);

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::new();
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let id = doc
                .get_first(self.id_field)
                .and_then(|v: &OwnedValue| v.as_str())
                .unwrap_or("")
                .to_string();
            let content = doc
                .get_first(self.content_field)
                .and_then(|v: &OwnedValue| v.as_str())
                .unwrap_or("")
                .to_string();
            hits.push(MemoryHit { id, content, score });
        }

        debug!(
            "Memory search for '{}' (user {}) returned {} hits",
            query_str,
            user_id,
            hits.len()
        );
        Ok(hits)
    }

    fn get_writer(&self) -> Result<IndexWriter> {
        self.index
            .writer(50_000_000)
            .context("Failed to create index writer")
    }
}
