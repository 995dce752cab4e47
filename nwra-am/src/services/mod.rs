//! Services for nwra-am

pub mod file_catalog;
pub mod fingerprint_store;
pub mod post_action;
pub mod provenance;

pub use file_catalog::{Catalog, CatalogError, CategoryFiles, FileCatalog, SpecExpansion};
pub use fingerprint_store::{
    calculate_file_md5, file_stat, FileStat, FingerprintStore, ProcessedFingerprint,
};
pub use post_action::{PostAction, PostActionOutcome};
pub use provenance::{ProvenanceRecorder, SoftwareInfo};
