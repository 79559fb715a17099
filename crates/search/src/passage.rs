//! Passages and the citations derived from them

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Inclusive page span of a passage (1-based)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end: end.max(start) }
    }

    pub fn single(page: u32) -> Self {
        Self::new(page, page)
    }
}

/// A contiguous span of a document, the atomic unit of retrieval.
///
/// Passages are created by ingestion and never mutated by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    /// Unique within its document
    pub id: Uuid,

    pub document_id: Uuid,

    pub text: String,

    pub pages: PageRange,

    /// Section headings from outermost to innermost
    pub section_path: Vec<String>,

    /// Embedding for the model the passage was fetched with
    pub embedding: Option<Vec<f32>>,

    pub is_table: bool,

    pub is_figure: bool,
}

impl Passage {
    /// Section path rendered as `Outer > Inner`, `None` when empty
    pub fn section(&self) -> Option<String> {
        if self.section_path.is_empty() {
            None
        } else {
            Some(self.section_path.join(" > "))
        }
    }
}

/// Traceability back to a location in the source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub document_id: Uuid,
    pub passage_id: Uuid,
    pub page_start: u32,
    pub page_end: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl Citation {
    pub fn new(document_id: Uuid, passage_id: Uuid, pages: PageRange, section_path: &[String]) -> Self {
        Self {
            document_id,
            passage_id,
            page_start: pages.start,
            page_end: pages.end,
            section: if section_path.is_empty() {
                None
            } else {
                Some(section_path.join(" > "))
            },
        }
    }

    pub fn from_passage(passage: &Passage) -> Self {
        Self::new(passage.document_id, passage.id, passage.pages, &passage.section_path)
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.page_start == self.page_end {
            write!(f, "p. {}", self.page_start)?;
        } else {
            write!(f, "pp. {}-{}", self.page_start, self.page_end)?;
        }
        if let Some(section) = &self.section {
            write!(f, ", §{}", section)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(section_path: Vec<&str>, pages: PageRange) -> Passage {
        Passage {
            id: Uuid::from_u128(7),
            document_id: Uuid::from_u128(1),
            text: "TP53 is mutated in half of human cancers.".to_string(),
            pages,
            section_path: section_path.into_iter().map(String::from).collect(),
            embedding: None,
            is_table: false,
            is_figure: false,
        }
    }

    #[test]
    fn test_citation_single_page() {
        let citation = Citation::from_passage(&passage(vec!["Results", "Mutations"], PageRange::single(4)));
        assert_eq!(citation.section.as_deref(), Some("Results > Mutations"));
        assert_eq!(citation.to_string(), "p. 4, §Results > Mutations");
    }

    #[test]
    fn test_citation_page_span_without_section() {
        let citation = Citation::from_passage(&passage(vec![], PageRange::new(2, 3)));
        assert_eq!(citation.section, None);
        assert_eq!(citation.to_string(), "pp. 2-3");
    }

    #[test]
    fn test_page_range_normalizes_reversed_bounds() {
        let range = PageRange::new(5, 2);
        assert_eq!(range.end, 5);
    }
}
