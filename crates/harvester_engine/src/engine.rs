use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use harvester_core::{ConfigError, HarvestResult, SourceConfig};
use tokio_util::sync::CancellationToken;

use crate::archive::RawPageArchive;
use crate::bootstrap::{bootstrap_from_config, SessionBootstrap};
use crate::session::{HarvestSession, SessionError};
use crate::transport::{FetchSettings, ReqwestTransport, TransportError};
use crate::{ChannelProgressSink, EngineEvent};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid source configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to start async runtime: {0}")]
    Runtime(String),
    #[error("harvest worker thread panicked")]
    WorkerPanicked,
}

/// Optional wiring for [`EngineHandle::launch`].
#[derive(Default)]
pub struct EngineOptions {
    pub settings: FetchSettings,
    /// Replaces the bootstrap the source names, e.g. with a shared one.
    pub bootstrap: Option<Box<dyn SessionBootstrap>>,
    pub archive: Option<RawPageArchive>,
}

/// Runs one harvest on a dedicated thread with its own Tokio runtime, so a
/// synchronous caller can poll progress events and cancel.
pub struct EngineHandle {
    cancel: CancellationToken,
    event_rx: mpsc::Receiver<EngineEvent>,
    worker: thread::JoinHandle<Result<HarvestResult, EngineError>>,
}

impl EngineHandle {
    pub fn start(config: SourceConfig, settings: FetchSettings) -> Result<Self, EngineError> {
        Self::launch(
            config,
            EngineOptions {
                settings,
                ..EngineOptions::default()
            },
        )
    }

    pub fn launch(config: SourceConfig, options: EngineOptions) -> Result<Self, EngineError> {
        let EngineOptions {
            settings,
            bootstrap,
            archive,
        } = options;
        let transport = ReqwestTransport::new(&config, settings.clone())?;
        let bootstrap =
            bootstrap.unwrap_or_else(|| bootstrap_from_config(&config.bootstrap, &settings));
        let (event_tx, event_rx) = mpsc::channel();
        let mut session = HarvestSession::new(&config, Box::new(transport), bootstrap)?
            .with_progress(Box::new(ChannelProgressSink::new(event_tx)));
        if let Some(archive) = archive {
            session = session.with_archive(archive);
        }
        let cancel = session.cancellation_token();

        let worker = thread::spawn(move || -> Result<HarvestResult, EngineError> {
            let runtime = tokio::runtime::Runtime::new()
                .map_err(|err| EngineError::Runtime(err.to_string()))?;
            Ok(runtime.block_on(session.run())?)
        });

        Ok(Self {
            cancel,
            event_rx,
            worker,
        })
    }

    /// Asks the harvest to stop before its next fetch; rows so far are kept.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Waits for the harvest and returns its result.
    pub fn join(self) -> Result<HarvestResult, EngineError> {
        self.worker.join().map_err(|_| EngineError::WorkerPanicked)?
    }
}
