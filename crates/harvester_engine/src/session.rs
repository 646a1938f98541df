use std::collections::VecDeque;
use std::time::Duration;

use engine_logging::{
    clear_harvest_context, engine_debug, engine_info, engine_warn, set_harvest_context,
};
use harvester_core::{
    update, ConfigError, Effect, FailureKind, FetchError, HarvestResult, HarvestState, Msg,
    SourceConfig,
};
use tokio_util::sync::CancellationToken;

use crate::archive::RawPageArchive;
use crate::bootstrap::SessionBootstrap;
use crate::transport::PageTransport;
use crate::{BootstrapError, EngineEvent, NullProgressSink, ProgressSink};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),
    /// The controller stopped asking for work without finishing.
    #[error("harvest of {0} stalled before reaching a terminal state")]
    Stalled(String),
}

/// One harvest of one source: bootstraps credentials, then executes the
/// controller's effects until it finishes.
pub struct HarvestSession {
    state: HarvestState,
    transport: Box<dyn PageTransport>,
    bootstrap: Box<dyn SessionBootstrap>,
    fetch_timeout: Duration,
    cancel: CancellationToken,
    sink: Box<dyn ProgressSink>,
    archive: Option<RawPageArchive>,
}

impl HarvestSession {
    pub fn new(
        config: &SourceConfig,
        transport: Box<dyn PageTransport>,
        bootstrap: Box<dyn SessionBootstrap>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            state: HarvestState::new(config)?,
            transport,
            bootstrap,
            fetch_timeout: config.fetch_timeout(),
            cancel: CancellationToken::new(),
            sink: Box::new(NullProgressSink),
            archive: None,
        })
    }

    /// Keeps every loaded page in `archive`. Archive failures are logged and
    /// never stop the harvest.
    pub fn with_archive(mut self, archive: RawPageArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_progress(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the harvest before its next fetch.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<HarvestResult, SessionError> {
        let Self {
            mut state,
            transport,
            bootstrap,
            fetch_timeout,
            cancel,
            sink,
            archive,
        } = self;
        let source = state.source().to_string();

        set_harvest_context(&source, 0);
        engine_info!("Bootstrapping session");
        let credentials = match bootstrap.bootstrap().await {
            Ok(credentials) => credentials,
            Err(err) => {
                engine_warn!("Bootstrap failed: {}", err);
                clear_harvest_context();
                return Err(err.into());
            }
        };
        sink.emit(EngineEvent::BootstrapCompleted {
            source: source.clone(),
            credentials: credentials.len(),
        });

        if cancel.is_cancelled() {
            state = update(state, Msg::CancelRequested).0;
        }
        let (next, effects) = update(state, Msg::Start);
        state = next;
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            let msg = match effect {
                Effect::Fetch { cursor, attempt } => {
                    set_harvest_context(&source, cursor.page());
                    engine_debug!("Fetching {} (attempt {})", cursor, attempt);
                    let outcome =
                        tokio::time::timeout(fetch_timeout, transport.fetch(&cursor, &credentials))
                            .await
                            .unwrap_or_else(|_| {
                                Err(FetchError::new(
                                    FailureKind::Timeout,
                                    format!("no response within {}ms", fetch_timeout.as_millis()),
                                ))
                            });
                    match outcome {
                        Ok(page) => {
                            if let Some(archive) = &archive {
                                if let Err(err) = archive.store(&cursor, &page) {
                                    engine_warn!("Failed to archive page at {}: {}", cursor, err);
                                }
                            }
                            Msg::PageLoaded { cursor, page }
                        }
                        Err(error) => {
                            sink.emit(EngineEvent::FetchFailed {
                                cursor: cursor.clone(),
                                attempt,
                                error: error.clone(),
                            });
                            Msg::FetchFailed { cursor, error }
                        }
                    }
                }
                Effect::Sleep { duration, reason } => {
                    engine_debug!("Sleeping {:?} ({:?})", duration, reason);
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = cancel.cancelled() => {}
                    }
                    if cancel.is_cancelled() {
                        state = update(state, Msg::CancelRequested).0;
                    }
                    Msg::Wake
                }
                Effect::Finish(reason) => {
                    sink.emit(EngineEvent::HarvestFinished {
                        source: source.clone(),
                        reason,
                        pages: state.pages(),
                        rows: state.rows().len(),
                    });
                    break;
                }
            };

            let page_loaded = matches!(msg, Msg::PageLoaded { .. });
            let (next, effects) = update(state, msg);
            state = next;
            if page_loaded {
                sink.emit(EngineEvent::PageCompleted(state.view()));
            }
            queue.extend(effects);
        }

        clear_harvest_context();
        state.into_result().ok_or(SessionError::Stalled(source))
    }
}
