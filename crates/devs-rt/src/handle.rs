//! Out-of-band commands to a running real-time driver.

use devs_core::Event;
use tokio::sync::mpsc;

use crate::{RtError, RtResult};

#[derive(Debug)]
pub enum RtCommand {
    /// Deliver `event` as imported by `model_uri`, at the current simulated time.
    Inject { model_uri: String, event: Event },
    /// Deliver `event` as imported by the root.
    InjectImported(Event),
    /// Bring every HIOA model to the current simulated time.
    CausalRefresh,
    /// End the run at the current simulated time.
    Stop,
}

/// Cloneable, `Send` handle to a [`RealTimeDriver`](crate::RealTimeDriver).
///
/// Every method fails with [`RtError::Disconnected`] once the driver has
/// finished.
#[derive(Clone, Debug)]
pub struct RtHandle {
    tx: mpsc::UnboundedSender<RtCommand>,
}

/// Receiving end of an [`RtHandle`] channel, consumed by the driver it is
/// given to.
#[derive(Debug)]
pub struct RtCommands(pub(crate) mpsc::UnboundedReceiver<RtCommand>);

impl RtHandle {
    /// A handle and the command stream it feeds.  Made ahead of the driver
    /// when other runs need the handle before the driver exists.
    pub fn channel() -> (Self, RtCommands) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, RtCommands(rx))
    }

    pub fn send(&self, command: RtCommand) -> RtResult<()> {
        self.tx.send(command).map_err(|_| RtError::Disconnected)
    }

    pub fn inject(&self, model_uri: impl Into<String>, event: Event) -> RtResult<()> {
        self.send(RtCommand::Inject { model_uri: model_uri.into(), event })
    }

    pub fn inject_imported(&self, event: Event) -> RtResult<()> {
        self.send(RtCommand::InjectImported(event))
    }

    pub fn refresh(&self) -> RtResult<()> {
        self.send(RtCommand::CausalRefresh)
    }

    pub fn stop(&self) -> RtResult<()> {
        self.send(RtCommand::Stop)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Where a run sends the events its root exports: injected into
/// `model_uri` of the run behind `handle`.
#[derive(Clone, Debug)]
pub struct ExportTarget {
    pub handle:    RtHandle,
    pub model_uri: String,
}

impl ExportTarget {
    pub fn new(handle: RtHandle, model_uri: impl Into<String>) -> Self {
        Self { handle, model_uri: model_uri.into() }
    }

    /// Forward `event`; `false` once the receiving run has finished.
    pub fn forward(&self, event: Event) -> bool {
        self.handle.inject(self.model_uri.clone(), event).is_ok()
    }
}
