//! In-memory music library database with live query models.
//!
//! Core modules:
//! - [`db`] - Entry store: identity, typed properties, staging and commit
//! - [`query`] - Query terms, evaluation and the JSON query format
//! - [`model`] - Live filtered, sorted and chainable views over entries
//! - [`worker`] - Background commit thread
//!
//! ### Supporting Modules
//!
//! - [`entry`] - Entries, property keys and values
//! - [`entry_type`] - Entry type definitions and the per-database registry
//! - [`commit`] - Commit batches, change records and summaries
//! - [`progress`] - Busy state and bulk-operation progress
//! - [`config`] - Configuration loading
//! - [`error`] - Error types
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use rhythmdb::{PropKey, Query, QueryTerm, RhythmDb};
//! use rhythmdb::model::{ModelEvent, ModelOptions, ModelSource, QueryModel, SortKey, SortOrder};
//! use rhythmdb::worker::CommitWorker;
//!
//! let db = RhythmDb::with_config(rhythmdb::config::DbConfig::load(None)?);
//! let worker = CommitWorker::spawn(db.clone())?;
//!
//! // Stage an import; nothing is visible until the worker commits.
//! let song = db.entry_type("song").expect("built-in type");
//! let import = db.begin_bulk("Importing", Some(1));
//! let id = db.create_entry(&song, "file:///music/nin/sin.ogg")?;
//! db.set_property(id, PropKey::Title, "Sin")?;
//! db.set_property(id, PropKey::Artist, "Nine Inch Nails")?;
//! import.advance(1);
//! drop(import);
//!
//! // A sorted library view and a search filtered from it.
//! let library = QueryModel::new(
//!     &db,
//!     ModelSource::Store,
//!     ModelOptions::new().with_sort(SortOrder::ascending(SortKey::Artist)),
//! );
//! let search = QueryModel::new_chained(
//!     &library,
//!     ModelOptions::new().with_query(Query::parse([
//!         QueryTerm::like(PropKey::SearchMatch, "nine inch"),
//!     ])?),
//! );
//! search.subscribe(|event: &ModelEvent| println!("{} {}", event.name(), event.entry().title()));
//!
//! worker.flush();
//! assert_eq!(search.count(), 1);
//! worker.shutdown();
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Store and query operations return [`DbError`]: duplicate entries,
//! unknown or read-only properties, kind mismatches, deleted entries and
//! malformed queries. None of them leave the database unusable. Query
//! evaluation never fails; undefined properties simply do not match.
//! Configuration loading returns `anyhow::Result` with file context.
//!
//! ## Threading
//!
//! [`RhythmDb`] is a cloneable handle. Any thread may stage changes; commits
//! are serialized and deliver notifications synchronously on the committing
//! thread, normally the [`worker::CommitWorker`]. Committed entries are
//! immutable `Arc` snapshots, so queries can evaluate them from any thread.

pub mod commit;
pub mod config;
pub mod db;
pub mod entry;
pub mod entry_type;
pub mod error;
pub mod model;
pub mod progress;
pub mod query;
pub mod worker;

pub use commit::{CommitSummary, PropChange};
pub use db::{EntryObserver, RhythmDb};
pub use entry::{Entry, EntryId, PropKey, Value, ValueKind};
pub use entry_type::{EntryType, EntryTypeDef};
pub use error::{DbError, Result};
pub use query::{Query, QueryOp, QueryTerm};
