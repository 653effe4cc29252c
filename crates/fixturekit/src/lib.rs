//! # fixturekit
//!
//! Staged generation of synthetic cluster fixtures for scale benchmarks.
//!
//! Given a stream of node documents and a stream of pod documents, the
//! crate decides which pods fit on which nodes, first-fit and in input
//! order, and emits the result as a series of growing snapshots (stages).
//! Each snapshot can be reshaped for a benchmark backend: kubemark hollow
//! nodes, kwok fake nodes, or an offline scheduler simulator.
//!
//! ## Example
//!
//! ```no_run
//! use fixturekit::{Backend, MissPolicy, OutputWriter, document, record};
//! use std::path::Path;
//!
//! let nodes = record::nodes_from_documents(
//!     document::load_stream(Path::new("nodes.yaml"), Some(300))?,
//! )?;
//! let pods = record::pods_from_documents(document::load_stream(Path::new("pods.yaml"), None)?)?;
//!
//! let backend = Backend::Kwok;
//! let packer = backend.packer(None, MissPolicy::Skip)?;
//! let writer = OutputWriter::new("out", backend.file_prefix());
//!
//! for stage in fixturekit::generate(nodes, pods, 100, packer) {
//!     writer.write_stage(&stage)?;
//! }
//! # Ok::<(), fixturekit::Error>(())
//! ```
//!
//! ## Guarantees
//!
//! - A node's assigned requests never exceed its capacity in either dimension.
//! - A pod is placed at most once across all stages.
//! - Nodes of finished stages are never scanned again.
//! - The same inputs always produce byte-identical output.

pub mod backend;
pub mod document;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod packer;
pub mod progress;
pub mod quantity;
pub mod record;
pub mod stages;
pub mod transform;
pub mod writer;

pub use backend::Backend;
pub use error::{Error, ErrorCategory, Result};
pub use generator::{GeneratorState, OutputMode, StageOutput, StagedGenerator, generate};
pub use ledger::{Ledger, LedgerEntry};
pub use packer::{MissPolicy, NodeSlice, PackOutcome, Packer, Placement, PlacementMiss};
pub use progress::{NoProgress, ProgressReporter};
pub use quantity::{Quantity, Resources};
pub use record::{NodeRecord, PodRecord};
pub use stages::{StagePlan, plan_stages};
pub use transform::{HollowNodeTemplate, NodeVariant, PodVariant};
pub use writer::{Layout, OutputWriter, StageFiles};
