//! PostgreSQL passage store
//!
//! Vector queries use pgvector's cosine distance operator over
//! `passage_embeddings`; text queries rank `passages.text_search_vector`
//! with `ts_rank_cd`. Ties fall back to `chunk_index` so results are stable.

use super::PassageStore;
use crate::passage::{PageRange, Passage};
use crate::retrieval::{RetrievalCandidate, RetrievalSource};
use docforge_common::db::models::{
    format_vector_literal, PassageColumn, PassageEmbeddingEntity, PassageEntity, PassageRow,
};
use docforge_common::db::DbPool;
use docforge_common::errors::{AppError, Result};
use sea_orm::{
    ColumnTrait, DbBackend, DbErr, EntityTrait, FromQueryResult, QueryFilter, Statement, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const VECTOR_QUERY: &str = r#"
    SELECT
        e.passage_id,
        1 - (e.embedding <=> $1::vector) AS score
    FROM passage_embeddings e
    INNER JOIN passages p ON p.id = e.passage_id
    WHERE e.document_id = $2
      AND e.model = $3
      AND e.embedding IS NOT NULL
    ORDER BY e.embedding <=> $1::vector, p.chunk_index
    LIMIT $4
"#;

const TEXT_QUERY: &str = r#"
    SELECT
        p.id AS passage_id,
        ts_rank_cd(p.text_search_vector, plainto_tsquery('english', $2), 32)::float8 AS score
    FROM passages p
    WHERE p.document_id = $1
      AND p.text_search_vector @@ plainto_tsquery('english', $2)
    ORDER BY score DESC, p.chunk_index
    LIMIT $3
"#;

/// Query result row
#[derive(Debug, FromQueryResult)]
struct ScoreRow {
    passage_id: Uuid,
    score: f64,
}

/// Passage store over the primary (or replica) database
#[derive(Clone)]
pub struct PgPassageStore {
    db: Arc<DbPool>,
}

impl PgPassageStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    async fn scores(
        &self,
        sql: &str,
        values: Vec<Value>,
        source: RetrievalSource,
    ) -> Result<Vec<RetrievalCandidate>> {
        let rows = ScoreRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            values,
        ))
        .all(self.db.read())
        .await
        .map_err(unavailable)?;

        Ok(rows
            .into_iter()
            .map(|row| RetrievalCandidate::new(row.passage_id, row.score as f32, source))
            .collect())
    }

    /// Embeddings for `ids` under `model`, keyed by passage id
    async fn embeddings(
        &self,
        document_id: Uuid,
        ids: &[Uuid],
        model: &str,
    ) -> Result<HashMap<Uuid, Vec<f32>>> {
        let placeholders = (0..ids.len())
            .map(|i| format!("${}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT passage_id, model, document_id, embedding::text AS embedding
            FROM passage_embeddings
            WHERE document_id = $1
              AND model = $2
              AND passage_id IN ({})
            "#,
            placeholders
        );

        let mut values: Vec<Value> = vec![document_id.into(), model.into()];
        values.extend(ids.iter().map(|id| Value::from(*id)));

        let rows = PassageEmbeddingEntity::find()
            .from_raw_sql(Statement::from_sql_and_values(DbBackend::Postgres, &sql, values))
            .all(self.db.read())
            .await
            .map_err(unavailable)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.parse_embedding() {
                Some(embedding) => Some((row.passage_id, embedding)),
                None => {
                    warn!(passage_id = %row.passage_id, model = %row.model, "Unparseable stored embedding");
                    None
                }
            })
            .collect())
    }
}

fn unavailable(e: DbErr) -> AppError {
    AppError::unavailable("postgres", e.to_string())
}

/// Convert a stored row; negative page numbers clamp to zero
fn row_to_passage(row: PassageRow, embedding: Option<Vec<f32>>) -> Passage {
    let section_path = row.section_headings();
    let start = u32::try_from(row.page_start).unwrap_or(0);
    let end = u32::try_from(row.page_end).unwrap_or(0);
    Passage {
        id: row.id,
        document_id: row.document_id,
        text: row.content,
        pages: PageRange::new(start, end),
        section_path,
        embedding,
        is_table: row.is_table,
        is_figure: row.is_figure,
    }
}

#[async_trait::async_trait]
impl PassageStore for PgPassageStore {
    fn backend(&self) -> &str {
        "postgres"
    }

    async fn vector_query(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        model: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        self.scores(
            VECTOR_QUERY,
            vec![
                format_vector_literal(embedding).into(),
                document_id.into(),
                model.into(),
                (top_k as i64).into(),
            ],
            RetrievalSource::Vector,
        )
        .await
    }

    async fn text_query(
        &self,
        document_id: Uuid,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalCandidate>> {
        self.scores(
            TEXT_QUERY,
            vec![document_id.into(), query.into(), (top_k as i64).into()],
            RetrievalSource::Lexical,
        )
        .await
    }

    async fn fetch_passages(
        &self,
        document_id: Uuid,
        ids: &[Uuid],
        model: &str,
    ) -> Result<Vec<Passage>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = PassageEntity::find()
            .filter(PassageColumn::DocumentId.eq(document_id))
            .filter(PassageColumn::Id.is_in(ids.iter().copied()))
            .all(self.db.read())
            .await
            .map_err(unavailable)?;

        let mut embeddings = self.embeddings(document_id, ids, model).await?;
        let mut rows: HashMap<Uuid, PassageRow> =
            rows.into_iter().map(|row| (row.id, row)).collect();

        Ok(ids
            .iter()
            .filter_map(|id| {
                rows.remove(id)
                    .map(|row| row_to_passage(row, embeddings.remove(id)))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::prelude::DateTimeWithTimeZone;

    fn row(page_start: i32, page_end: i32) -> PassageRow {
        PassageRow {
            id: Uuid::from_u128(1),
            document_id: Uuid::from_u128(2),
            chunk_index: 0,
            content: "BRCA1 variants".to_string(),
            page_start,
            page_end,
            section_path: serde_json::json!(["Results", "Variants"]),
            is_table: true,
            is_figure: false,
            created_at: DateTimeWithTimeZone::default(),
        }
    }

    #[test]
    fn test_row_to_passage() {
        let passage = row_to_passage(row(4, 5), Some(vec![0.5, 0.5]));
        assert_eq!(passage.pages, PageRange::new(4, 5));
        assert_eq!(passage.section_path, vec!["Results", "Variants"]);
        assert_eq!(passage.text, "BRCA1 variants");
        assert!(passage.is_table);
        assert_eq!(passage.embedding, Some(vec![0.5, 0.5]));
    }

    #[test]
    fn test_row_to_passage_negative_pages() {
        let passage = row_to_passage(row(-1, -1), None);
        assert_eq!(passage.pages, PageRange::single(0));
    }

    #[test]
    fn test_queries_break_ties_by_chunk_index() {
        assert!(VECTOR_QUERY.contains("p.chunk_index"));
        assert!(TEXT_QUERY.contains("ORDER BY score DESC, p.chunk_index"));
    }
}
