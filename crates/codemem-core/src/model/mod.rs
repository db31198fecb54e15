//! Domain model - entities, enums, and metadata accessors.
//!
//! Ownership chain: Project → Session → Context → ContextFile +
//! embedding columns. FileIndex rows are owned by a synthetic
//! indexing session per project and only surface at retrieval time.

mod kinds;
pub mod metadata;
mod records;

pub use kinds::{ChangeType, ContextType, ImpactLevel, RelationType, SessionStatus};
pub use records::{
    Context, ContextFile, ContextFileEntry, ContextPatch, DiffStats, FileIndexEntry, MemoryStats,
    NewContext, NewFileIndexEntry, Project, ProjectSummary, Relationship, Session,
};
