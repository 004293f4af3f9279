//! loadcast-state — embedded training-metadata store for Loadcast.
//!
//! Backed by [redb](https://docs.rs/redb), records when each metric's
//! forecast model was last trained so that health queries can report
//! trained/untrained status without touching the live model.
//!
//! Write ownership is deliberately narrow: the retrain path is the single
//! writer; health queries are read-only consumers.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::TrainingRecord;
