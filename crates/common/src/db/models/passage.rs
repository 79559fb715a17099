//! Passage entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "passages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    /// Insertion order within the document, used for tie-breaks
    pub chunk_index: i32,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub page_start: i32,

    pub page_end: i32,

    /// Section headings from outermost to innermost, as a JSON array
    #[sea_orm(column_type = "JsonBinary")]
    pub section_path: Json,

    pub is_table: bool,

    pub is_figure: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::passage_embedding::Entity")]
    Embeddings,
}

impl Related<super::passage_embedding::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Embeddings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Section path as owned strings; non-string entries are skipped
    pub fn section_headings(&self) -> Vec<String> {
        self.section_path
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
