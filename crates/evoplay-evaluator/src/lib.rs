//! Fitness evaluation of flat weight vectors.
//!
//! A candidate solution of the search is a flat vector of real-valued genes. This crate
//! turns such a vector into a policy and scores it by playing the target game:
//!
//! 1. **Model** ([`model`]) - architecture description ([`ModelSpec`]) and the parameter
//!    count it implies for a game's per-phase input/output sizes
//! 2. **Network** ([`network`]) - the forward pass; one sub-network per game phase,
//!    each owning a consecutive slice of the genes
//! 3. **Model file** ([`model_file`]) - JSON persistence of `{model_name, model, weights}`,
//!    used for checkpoints and for engines that load the policy themselves
//! 4. **Fitness** ([`fitness`]) - plays a batch of episodes through
//!    [`evoplay_engine::GameSession`] and reduces the scores to one number
//!
//! # Architecture
//!
//! ```text
//! genes ─▶ ModelSpec::build ─▶ PhasedPolicy ─┐
//!   │                                        ├─▶ GameSession::play ─▶ scores ─▶ fitness
//!   └──▶ ModelFile (temporary, if needed) ───┘
//! ```
//!
//! Evaluation never mutates the genes, and a fitness value is a pure function of
//! `(genes, seed)` as long as the engine is deterministic for a given seed.

pub use self::{fitness::*, model::*, model_file::*, network::*};

pub mod fitness;
pub mod model;
pub mod model_file;
pub mod network;
