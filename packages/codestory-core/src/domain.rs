//! Labeled-property-graph entities.
//!
//! `NodeLabel` and `RelationshipType` name the schema; the structs below are
//! the typed view each step builds before handing properties to the graph
//! store adapter. None of these types talk to a backend — they are plain
//! data, serializable for the adapter's parameter maps and for the
//! `.summaries/*.json` audit dumps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Node labels used across the graph. Kept as an enum (rather than bare
/// strings) so every call site gets compile-time coverage of the full set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeLabel {
    Repository,
    Directory,
    File,
    Class,
    Function,
    Method,
    Module,
    Summary,
    Documentation,
    DocumentationEntity,
    Ast,
    ProcessingRecord,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Repository => "Repository",
            NodeLabel::Directory => "Directory",
            NodeLabel::File => "File",
            NodeLabel::Class => "Class",
            NodeLabel::Function => "Function",
            NodeLabel::Method => "Method",
            NodeLabel::Module => "Module",
            NodeLabel::Summary => "Summary",
            NodeLabel::Documentation => "Documentation",
            NodeLabel::DocumentationEntity => "DocumentationEntity",
            NodeLabel::Ast => "AST",
            NodeLabel::ProcessingRecord => "ProcessingRecord",
        }
    }

    /// Priority used to break cycles deterministically in the summarizer DAG
    /// (higher processes later when a tie needs breaking). Structural
    /// containers outrank the symbols they contain.
    pub fn cycle_priority(&self) -> u8 {
        match self {
            NodeLabel::Repository => 0,
            NodeLabel::Directory => 1,
            NodeLabel::Module => 2,
            NodeLabel::File => 3,
            NodeLabel::Class => 4,
            NodeLabel::Function => 5,
            NodeLabel::Method => 6,
            NodeLabel::Summary
            | NodeLabel::Documentation
            | NodeLabel::DocumentationEntity
            | NodeLabel::Ast
            | NodeLabel::ProcessingRecord => 7,
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship types used across the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    Contains,
    Imports,
    Calls,
    InheritsFrom,
    HasSummary,
    HasDocumentation,
    Describes,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::InheritsFrom => "INHERITS_FROM",
            RelationshipType::HasSummary => "HAS_SUMMARY",
            RelationshipType::HasDocumentation => "HAS_DOCUMENTATION",
            RelationshipType::Describes => "DESCRIBES",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One ingested repository root. `path` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub path: String,
    pub name: String,
}

/// A directory relative to the repository root. `path` is POSIX-style and
/// repo-relative; it is the unique key (invariant 3.1.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub path: String,
    pub name: String,
}

/// A file relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub path: String,
    pub name: String,
    pub extension: Option<String>,
    pub size: u64,
    pub modified_unix: i64,
}

/// A class symbol. `qualified_name` (`module.Class`) is unique within its
/// module (invariant 3.1.5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNode {
    pub name: String,
    pub qualified_name: String,
    pub module: String,
}

/// A free function or a class method. `kind` distinguishes the two at the
/// label level (`Function` vs `Method`); this struct backs both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: String,
    pub qualified_name: String,
    pub module: String,
    pub is_method: bool,
}

/// A module (typically one file's importable namespace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub name: String,
}

/// An LLM-generated natural-language summary attached to exactly one source
/// node via `HAS_SUMMARY` (invariant 3.1.3). Summaries never reference each
/// other (invariant 3.1.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryNode {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub source_type: String,
}

impl SummaryNode {
    pub fn new(text: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            created_at: Utc::now(),
            source_type: source_type.into(),
        }
    }
}

/// A documentation artifact (markdown file, docstring block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationNode {
    pub path: String,
    pub name: String,
    pub content_type: String,
    pub content: String,
}

/// An entity named by a documentation artifact (a class/function mentioned
/// by name in prose), linked back to code via `DESCRIBES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentationEntity {
    pub name: String,
    pub entity_type: String,
    pub description: Option<String>,
}

/// Audit record of one step's run against one job, written on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub step: String,
    pub job_id: String,
    pub nodes_written: u64,
    pub edges_written: u64,
    pub duration_ms: u64,
}
