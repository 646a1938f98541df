use crate::{Cursor, FetchError, RawPage};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Begin the harvest at the first cursor.
    Start,
    /// The transport returned a page for `cursor`.
    PageLoaded { cursor: Cursor, page: RawPage },
    /// The transport failed (or timed out) for `cursor`.
    FetchFailed { cursor: Cursor, error: FetchError },
    /// A requested sleep has elapsed.
    Wake,
    /// Caller asked to stop; observed before the next fetch.
    CancelRequested,
}
