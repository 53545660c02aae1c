pub mod author;
pub mod changeset;
pub mod commit;
pub mod hgtags;

pub use author::Author;
pub use changeset::{Changeset, FileChange, FileMode, FileOp};
pub use commit::{CommitBuilder, CommitMeta};
