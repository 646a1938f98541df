//! Offline harvest over pages fetched by an earlier run.
use std::collections::VecDeque;

use engine_logging::engine_info;

use crate::config::{ConfigError, SourceConfig};
use crate::{update, Effect, FailureKind, FetchError, HarvestResult, HarvestState, Msg, RawPage};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("invalid source configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("replay of {0} stalled before reaching a terminal state")]
    Stalled(String),
}

/// Runs the controller with `pages` standing in for the transport: each
/// `Fetch` is answered by the next page and sleeps return at once.
///
/// When the pages run out before the controller stops on its own, the replay
/// is cancelled, so an archive cut short by a failed run yields a partial
/// result with `Cancelled` rather than a guessed reason.
pub fn replay(
    config: &SourceConfig,
    pages: impl IntoIterator<Item = RawPage>,
) -> Result<HarvestResult, ReplayError> {
    let mut pages = pages.into_iter().peekable();
    let mut state = HarvestState::new(config)?;
    if pages.peek().is_none() {
        state = update(state, Msg::CancelRequested).0;
    }
    let (next, effects) = update(state, Msg::Start);
    state = next;
    let mut queue: VecDeque<Effect> = effects.into();

    while let Some(effect) = queue.pop_front() {
        let msg = match effect {
            Effect::Fetch { cursor, .. } => match pages.next() {
                Some(page) => Msg::PageLoaded { cursor, page },
                None => Msg::FetchFailed {
                    cursor,
                    error: FetchError::new(FailureKind::Malformed, "archive has no page left"),
                },
            },
            Effect::Sleep { .. } => {
                if pages.peek().is_none() {
                    engine_info!("Archive of {} exhausted", state.source());
                    state = update(state, Msg::CancelRequested).0;
                }
                Msg::Wake
            }
            Effect::Finish(_) => break,
        };
        let (next, effects) = update(state, msg);
        state = next;
        queue.extend(effects);
    }

    let source = state.source().to_string();
    state.into_result().ok_or(ReplayError::Stalled(source))
}
