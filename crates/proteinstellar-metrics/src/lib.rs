//! Metrics over predicted structures: confidence summaries, residue
//! contacts, and superposition-based similarity to a reference.

pub mod confidence;
pub mod contacts;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod superpose;
pub mod value;

pub use contacts::{count_contacts, ContactCounts, ContactInput, GRID_THRESHOLD};
pub use engine::{keys, MetricsConfig, MetricsEngine, ResidueMapping};
pub use error::MetricsError;
pub use geometry::{contact_map, distance_matrix, radius_of_gyration};
pub use superpose::{gdt_ts, rmsd, tm_d0, tm_score, Superposition, GDT_CUTOFFS};
pub use value::{Matrix, MetricSet, MetricValue};
