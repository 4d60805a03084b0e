pub mod store;
pub mod types;

pub use store::{AnnotationStore, ANNOTATIONS_DB_NAME};
pub use types::{AdAnnotation, AnnotationUpdate, FunnelStage, Verdict};
