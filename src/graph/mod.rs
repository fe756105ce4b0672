//! Object graph: the store, the object model, and the propagation engine.
//!
//! Every mutation of an object goes through [`PropagationEngine::apply`], which
//! merges the write and then settles the downstream writes it implies.
//!
//! # Architecture
//!
//! ```text
//! apply(root, props) ──► worklist ──► merge into staged copy ──► discover
//!                           ▲                                       │
//!                           └───────── slider target / slaves ──────┘
//!                                      switch target
//!                        drain ──► commit overlay ──► manual triggers
//! ```

pub mod engine;
pub mod error;
pub mod fields;
pub mod object;
pub mod store;

pub use engine::{PropagationEngine, Settled, DEFAULT_MAX_STEPS};
pub use error::{PropagationError, PropagationResult};
pub use fields::NumericField;
pub use object::{
    keys, Bridge, ExecutionMode, InputMapping, InputMode, Instruction, Object, OutputMapping,
    OutputMode, SequencedBlock, Shape, ShapeKind, Slider, Switch,
};
pub use store::ObjectStore;
