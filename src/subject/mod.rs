//! §4.4 Subject Loader, §4.5 Structural Change Processor and the supporting
//! subject <-> NodeId registry (§3, §9).

pub mod loader;
pub mod model;
pub mod registry;
pub mod structural;

pub use loader::SubjectLoader;
pub use model::{
    Property, PropertyKind, Subject, SubjectFactory, SubjectId, SourcePathProvider, SubjectUpdater,
};
pub use registry::SubjectRegistry;
pub use structural::StructuralChangeProcessor;
