//! Lexical candidate index built on tantivy.
//!
//! One document per stored record: the record id (raw, for deletes and
//! joins) and the identifier-split text. Scores are tantivy's BM25.

use std::path::Path;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

pub struct Bm25Index {
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    f_id: Field,
    f_text: Field,
}

impl Bm25Index {
    /// Create or open the lexical index at the given directory.
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;

        let mut schema_builder = Schema::builder();
        let f_id = schema_builder.add_text_field("id", STRING | STORED);
        let f_text = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = if dir.join("meta.json").exists() {
            Index::open_in_dir(dir).context("failed to open lexical index")?
        } else {
            Index::create_in_dir(dir, schema).context("failed to create lexical index")?
        };

        let writer = index
            .writer(WRITER_MEMORY_BYTES)
            .context("failed to create lexical index writer")?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("failed to create lexical index reader")?;

        Ok(Self {
            index,
            writer: Mutex::new(writer),
            reader,
            f_id,
            f_text,
        })
    }

    /// Queue one record. Replaces any previous document with the same id.
    pub fn add(&self, id: &str, text: &str) -> Result<()> {
        let writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.f_id, id));
        writer.add_document(doc!(
            self.f_id => id,
            self.f_text => text,
        ))?;
        Ok(())
    }

    pub fn delete(&self, id: &str) {
        self.writer
            .lock()
            .delete_term(Term::from_field_text(self.f_id, id));
    }

    /// Commit queued changes and refresh the reader.
    pub fn commit(&self) -> Result<()> {
        self.writer.lock().commit().context("lexical index commit failed")?;
        self.reader.reload().context("lexical reader reload failed")?;
        Ok(())
    }

    /// BM25 candidates for a query, best first. The query is parsed
    /// leniently: stray punctuation in code queries must not error out.
    pub fn search(&self, query_text: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        if query_text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.f_text]);
        let (query, _errors) = parser.parse_query_lenient(query_text);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("lexical search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc: TantivyDocument = searcher.doc(addr).context("failed to load document")?;
            let Some(id) = doc.get_first(self.f_id).and_then(|v| v.as_str()) else {
                continue;
            };
            hits.push((id.to_string(), score));
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_search_delete() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::open_or_create(dir.path()).unwrap();

        index.add("a", "authenticate user with password").unwrap();
        index.add("b", "parse configuration file").unwrap();
        index.commit().unwrap();

        let hits = index.search("authenticate", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");

        index.delete("a");
        index.commit().unwrap();
        assert!(index.search("authenticate", 10).unwrap().is_empty());
    }

    #[test]
    fn add_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::open_or_create(dir.path()).unwrap();

        index.add("a", "old words here").unwrap();
        index.add("a", "new content entirely").unwrap();
        index.commit().unwrap();

        assert!(index.search("old", 10).unwrap().is_empty());
        assert_eq!(index.search("entirely", 10).unwrap().len(), 1);
    }

    #[test]
    fn punctuation_heavy_queries_do_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::open_or_create(dir.path()).unwrap();
        index.add("a", "fn main").unwrap();
        index.commit().unwrap();

        // Must not return Err even with unbalanced quotes and operators.
        let _ = index.search("fn main() -> \"Result<(), Error>", 5).unwrap();
    }

    #[test]
    fn reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = Bm25Index::open_or_create(dir.path()).unwrap();
            index.add("x", "persistent content").unwrap();
            index.commit().unwrap();
        }
        let index = Bm25Index::open_or_create(dir.path()).unwrap();
        let hits = index.search("persistent", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "x");
    }
}
