//! Lineage tracing core for a bulk-synchronous dataflow engine.
//!
//! Given a dataflow graph of partitioned datasets connected by narrow or
//! shuffle dependencies, this crate answers two dual questions: which sink
//! elements descend from source elements matching a predicate (forward
//! trace, [`trace::forward`]), and which source elements contributed to
//! sink elements matching a predicate (backward trace, [`trace`] — three
//! strategies, see [`trace::BackwardStrategy`]).
//!
//! The mechanism underneath both is a [`tag::Tag`]: a finite set of
//! source-element identities carried alongside every value ([`tagged`])
//! through a *lifted* form of whatever opaque transformation produced it
//! ([`lift`]). [`stage`] decomposes the path between two datasets into
//! stages separated by shuffle boundaries, since lineage composes
//! differently within a stage (pure per-element tag propagation) than
//! across one (a join on concrete element values).
//!
//! [`engine`] is a small single-threaded reference implementation of the
//! dataset contract this crate is built against — enough to run the
//! crate's own tests without a real cluster — and [`event_log`] /
//! [`reporter`] give the replay path a durable, checksum-verified record
//! of what a real engine run did.

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod lift;
pub mod reporter;
pub mod stage;
pub mod tag;
pub mod tagged;
pub mod trace;
pub mod unique_tag;
pub mod value;

pub use error::{LineageError, Result};
pub use tag::Tag;
pub use tagged::Tagged;
pub use trace::{trace_backward, BackwardStrategy};
pub use value::Value;
