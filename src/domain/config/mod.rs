pub mod project;
pub mod schema;
pub mod selector;
pub mod vars;

pub use project::{
    resolve, ConfigOverrides, MapRule, MappedRef, ProjectConfig, RefMapping, ReplaceRule,
    ResolvedConfig,
};
pub use schema::ConfigDocument;
pub use selector::ProjectFilter;
pub use vars::{SubstContext, VarEnv};
