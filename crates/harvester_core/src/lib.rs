//! Harvester core: pure pagination state machine, page extraction and record
//! normalization. Performs no IO; the engine executes the returned effects,
//! and [`replay`] answers them from pages kept by an earlier run.
mod config;
mod cursor;
mod effect;
mod error;
mod extract;
mod msg;
mod normalize;
mod page;
mod path;
mod replay;
mod row;
mod state;
mod update;
mod view_model;

pub use config::{
    BootstrapConfig, ChildPolicyConfig, ConfigError, FieldConfig, HtmlCatalog, HtmlField,
    PageFormat, PaginationConfig, RecordLayout, RetryPolicy, SourceConfig, Transform,
};
pub use cursor::{Continuation, Cursor, Pagination, Position};
pub use effect::{Effect, SleepReason};
pub use error::{FailureKind, FetchError};
pub use extract::{ExtractionError, PageExtractor};
pub use msg::Msg;
pub use normalize::{canonical_number, Normalizer};
pub use page::{PageMeta, RawPage};
pub use path::{is_blank, is_falsy, FieldPath, PathError, Segment};
pub use replay::{replay, ReplayError};
pub use row::{FieldKind, FieldValue, NormalizedRow, RowSchema};
pub use state::{HarvestResult, HarvestState, Phase, TerminalReason};
pub use update::update;
pub use view_model::HarvestView;
