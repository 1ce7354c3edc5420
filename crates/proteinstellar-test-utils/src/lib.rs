//! Test fixtures shared by the Proteinstellar crates' integration tests.
//!
//! - [`FakeEngine`]: an in-memory folding engine scripted per sequence, which
//!   records submissions and the number of simultaneously active jobs
//! - [`synthetic`]: well-formed PDB / mmCIF text generated from known geometry

pub mod fake_engine;
pub mod synthetic;

pub use fake_engine::{FakeEngine, Script};
pub use synthetic::{SyntheticChain, SyntheticResidue, SyntheticStructure};
