//! crabrl-dts - XBRL Discoverable Taxonomy Set resolution
//!
//! Licensed under AGPL-3.0

pub mod cache;
pub mod context;
pub mod diagnostics;
pub mod dimensions;
pub mod drs;
pub mod fetch;
pub mod label;
pub mod linkbase;
pub mod loader;
pub mod model;
pub mod ns;
pub mod registry;
pub mod relationships;
pub mod schema;
pub mod snapshot;
pub mod types;
pub mod validator;
pub mod xml;

// Re-export main types
pub use context::DtsContext;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, ErrorKind, Severity, TracingSink};
pub use drs::{DimensionError, DrsResolver, HypercubeTree, ResolvedHypercube};
pub use fetch::{DocumentFetcher, FileFetcher, MemoryFetcher};
pub use label::LabelResolver;
pub use linkbase::LinkKind;
pub use loader::{DtsHandle, DtsLoader, LoaderConfig};
pub use model::{ElementClass, QName};
pub use registry::{CyclesAllowed, RegistryError, RoleRegistry};
pub use snapshot::DtsSnapshot;
pub use types::TypeSystem;
pub use validator::{DtsValidator, ValidationError, ValidatorConfig};
pub use xml::{DocumentParser, QuickXmlParser};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}
