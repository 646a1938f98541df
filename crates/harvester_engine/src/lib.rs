//! Harvester engine: HTTP transport, session bootstrap and the async loop
//! executing the core's effects, plus the CSV/JSON output sink and the raw
//! page archive.
mod archive;
mod bootstrap;
mod decode;
mod engine;
mod export;
mod filename;
mod html;
mod persist;
mod session;
mod transport;
mod types;

pub use archive::{load_archive, ArchiveError, ArchivedRun, RawPageArchive};
pub use bootstrap::{
    bootstrap_from_config, LandingPageBootstrap, SessionBootstrap, SharedBootstrap,
    StaticCredentials,
};
pub use decode::{decode_body, DecodeError, DecodedBody};
pub use engine::{EngineError, EngineHandle, EngineOptions};
pub use export::{
    parse_csv, render_csv, render_json, write_csv, write_json, write_row, CsvOptions, ExportError,
    ExportSummary,
};
pub use filename::deterministic_filename;
pub use html::{parse_cards, validate_catalog};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use session::{HarvestSession, SessionError};
pub use transport::{FetchSettings, PageTransport, ReqwestTransport, TransportError};
pub use types::{
    BootstrapError, ChannelProgressSink, CredentialBag, EngineEvent, NullProgressSink,
    ProgressSink,
};

pub use harvester_core::{FailureKind, FetchError};
pub use tokio_util::sync::CancellationToken;
