//! SeaORM entity models
//!
//! Read-side entities for indexed passages

mod passage;
mod passage_embedding;

pub use passage::{
    Entity as PassageEntity,
    Model as PassageRow,
    Column as PassageColumn,
};

pub use passage_embedding::{
    Entity as PassageEmbeddingEntity,
    format_vector_literal,
};
