//! Per-model passage embedding entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "passage_embeddings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub passage_id: Uuid,

    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub model: String,

    pub document_id: Uuid,

    /// pgvector embedding read back as text (`embedding::text`)
    /// Actual vector operations done via raw SQL
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::passage::Entity",
        from = "Column::PassageId",
        to = "super::passage::Column::Id",
        on_delete = "Cascade"
    )]
    Passage,
}

impl Related<super::passage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Passage.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse embedding from stored text format to Vec<f32>
    pub fn parse_embedding(&self) -> Option<Vec<f32>> {
        self.embedding.as_deref().and_then(parse_vector_literal)
    }
}

/// Parse a pgvector literal such as `[1.0,2.0,3.0]`
pub fn parse_vector_literal(literal: &str) -> Option<Vec<f32>> {
    let inner = literal.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return None;
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

/// Format a slice as a pgvector literal
pub fn format_vector_literal(values: &[f32]) -> String {
    format!(
        "[{}]",
        values.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}
