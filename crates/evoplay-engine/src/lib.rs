//! Game-engine plumbing: everything between a policy and an external engine process.
//!
//! Game engines are black boxes reached through operating-system processes. This crate
//! owns the pieces needed to play them safely from many threads at once:
//!
//! - [`protocol`] - line codec (JSON observations in, whitespace-separated actions out)
//! - [`process`] - one engine process: spawn, write line, read line with a deadline, kill
//! - [`slot`] - fixed pool of exclusive numbered slots (ports / config files)
//! - [`game`] - closed registry of supported games and their invocation templates
//! - [`session`] - plays whole episodes against a [`Policy`], with timeout retries
//!
//! # Architecture
//!
//! ```text
//! GameSession ──acquire──▶ SlotAllocator
//!      │
//!      ├─launch(slot, seed)─▶ GameLauncher ─▶ EngineProcess (stdin/stdout pipes)
//!      │                                            │
//!      └─evaluate(state, phase)─▶ Policy      LineDecoder / encode_action
//! ```
//!
//! A session acquires a slot for every episode, so at most `N` engines run at once no
//! matter how many worker threads ask for episodes. The slot index selects a disjoint
//! engine configuration (typically a network port), which keeps concurrent engines
//! from interfering with each other.

pub use self::{game::*, policy::*, process::*, protocol::*, session::*, slot::*};

pub mod game;
pub mod policy;
pub mod process;
pub mod protocol;
pub mod session;
pub mod slot;
