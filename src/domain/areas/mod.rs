pub mod log;
pub mod pipeline;
pub mod refs;
pub mod repository;
pub mod source;

pub use log::{ConversionLog, LogFlags};
pub use pipeline::{Counters, Pipeline};
pub use refs::{AllocatedRef, Allocation, RefAllocator, RefKind};
pub use repository::{CommitSpec, GitCommandRepository, GitWriter, NullWriter};
pub use source::{ChangesetSource, HgCommandReader};
