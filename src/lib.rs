//! # WireCanvas: visual object graph wired to Firmata boards
//!
//! A canvas of shapes, sliders, switches, sequenced instruction blocks and
//! serial bridges. Objects are bound to each other's numeric properties; a
//! write to one object settles every write it implies before anything else can
//! observe the graph. Bridge objects map board pins onto object properties
//! over the Firmata wire protocol.
//!
//! ## Architecture
//!
//! - **Graph**: the object model and the breadth-first propagation engine
//! - **Sequencer**: round-robin instruction blocks on timers or triggers
//! - **Firmata**: wire encoding, the streaming decoder and value scaling
//! - **Bridge**: serial transports and per-connection sessions
//! - **Runtime**: the single thread that owns all of the above, driven over
//!   crossbeam channels
//!
//! ## Configuration
//!
//! Configuration (`config.toml`) and the default document (`document.json`)
//! live in the platform-appropriate data directory under
//! `dev.hxyulin.wirecanvas`:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.wirecanvas/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.wirecanvas/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.wirecanvas\`
//!
//! ## Example
//!
//! ```ignore
//! use wirecanvas::{
//!     bridge::SerialFactory,
//!     config::{AppConfig, Document},
//!     types::PropertyMap,
//! };
//!
//! let config = AppConfig::load_or_default();
//! let document = Document::open(config.document_path().unwrap())?;
//! let (handle, join) = wirecanvas::runtime::spawn(
//!     config,
//!     Some(Box::new(SerialFactory::default())),
//!     document,
//! )?;
//!
//! handle.apply("slider-1", PropertyMap::single("value", 42.0));
//! for msg in handle.drain() {
//!     println!("{:?}", msg);
//! }
//! handle.shutdown();
//! join.join().ok();
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod firmata;
pub mod graph;
pub mod runtime;
pub mod sequencer;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, Document};
pub use error::{Result, WireCanvasError};
pub use graph::{Object, PropagationEngine, PropagationError};
pub use runtime::{Runtime, RuntimeCommand, RuntimeHandle, RuntimeMessage};
pub use types::{ConnectionStatus, ObjectId, PropertyMap, PropertyValue};
