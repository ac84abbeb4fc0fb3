//! Schema element declarations and the idempotent initialization routine.
//!
//! Carries the *full* element set described in the spec (constraints,
//! fulltext indexes, property indexes, vector indexes) rather than the
//! reduced subset the original connector actually ran at startup.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaElement {
    UniqueConstraint {
        name: &'static str,
        label: &'static str,
        properties: &'static [&'static str],
    },
    FulltextIndex {
        name: &'static str,
        labels: &'static [&'static str],
        properties: &'static [&'static str],
    },
    PropertyIndex {
        name: &'static str,
        label: Option<&'static str>,
        property: &'static str,
    },
    VectorIndex {
        name: &'static str,
        label: &'static str,
        property: &'static str,
        dimensions: u32,
        similarity: &'static str,
    },
}

impl SchemaElement {
    pub fn name(&self) -> &'static str {
        match self {
            SchemaElement::UniqueConstraint { name, .. } => name,
            SchemaElement::FulltextIndex { name, .. } => name,
            SchemaElement::PropertyIndex { name, .. } => name,
            SchemaElement::VectorIndex { name, .. } => name,
        }
    }
}

pub const DEFAULT_VECTOR_DIMENSIONS: u32 = 1536;
pub const DEFAULT_SIMILARITY: &str = "cosine";

/// The declarative schema from spec section 4.1. Every constraint/index
/// named there appears here, not just the runtime subset the original
/// connector's `initialize_schema` actually created.
pub fn schema_elements() -> Vec<SchemaElement> {
    vec![
        SchemaElement::UniqueConstraint {
            name: "file_path_unique",
            label: "File",
            properties: &["path"],
        },
        SchemaElement::UniqueConstraint {
            name: "directory_path_unique",
            label: "Directory",
            properties: &["path"],
        },
        SchemaElement::UniqueConstraint {
            name: "module_name_unique",
            label: "Module",
            properties: &["name"],
        },
        SchemaElement::UniqueConstraint {
            name: "class_name_module_unique",
            label: "Class",
            properties: &["name", "module"],
        },
        SchemaElement::UniqueConstraint {
            name: "function_name_module_unique",
            label: "Function",
            properties: &["name", "module"],
        },
        SchemaElement::FulltextIndex {
            name: "file_content",
            labels: &["File"],
            properties: &["content"],
        },
        SchemaElement::FulltextIndex {
            name: "code_name",
            labels: &["Class", "Function", "Module"],
            properties: &["name"],
        },
        SchemaElement::FulltextIndex {
            name: "documentation_content",
            labels: &["Documentation"],
            properties: &["content"],
        },
        SchemaElement::PropertyIndex {
            name: "file_extension_idx",
            label: Some("File"),
            property: "extension",
        },
        SchemaElement::PropertyIndex {
            name: "node_created_at_idx",
            label: None,
            property: "created_at",
        },
        SchemaElement::VectorIndex {
            name: "summary_embedding",
            label: "Summary",
            property: "embedding",
            dimensions: DEFAULT_VECTOR_DIMENSIONS,
            similarity: DEFAULT_SIMILARITY,
        },
        SchemaElement::VectorIndex {
            name: "documentation_embedding",
            label: "Documentation",
            property: "embedding",
            dimensions: DEFAULT_VECTOR_DIMENSIONS,
            similarity: DEFAULT_SIMILARITY,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_elements_cover_every_spec_constraint() {
        let elements = schema_elements();
        let names: Vec<&str> = elements.iter().map(|e| e.name()).collect();
        assert!(names.contains(&"file_path_unique"));
        assert!(names.contains(&"directory_path_unique"));
        assert!(names.contains(&"module_name_unique"));
        assert!(names.contains(&"class_name_module_unique"));
        assert!(names.contains(&"function_name_module_unique"));
        assert!(names.contains(&"summary_embedding"));
        assert!(names.contains(&"documentation_embedding"));
        assert_eq!(elements.len(), 12);
    }

    #[test]
    fn vector_indexes_default_to_1536_cosine() {
        for e in schema_elements() {
            if let SchemaElement::VectorIndex {
                dimensions,
                similarity,
                ..
            } = e
            {
                assert_eq!(dimensions, DEFAULT_VECTOR_DIMENSIONS);
                assert_eq!(similarity, DEFAULT_SIMILARITY);
            }
        }
    }
}
