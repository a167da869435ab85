use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::{Receiver, Sender};

/// Broadcasts a run-level stop signal to every component that took out a listener.
///
/// The handle is cheap to clone and any clone may trigger the shutdown. Stopping is
/// cooperative: listeners are expected to notice the signal at a safe point, such as an
/// iteration boundary, rather than being interrupted.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
        }
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.sender.send(()) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log
            // message can be ignored.
            log::warn!("Failed to send shutdown signal: {e:?}");
        }
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

/// One subscriber to the shutdown broadcast.
///
/// Cloning produces an independent subscription, so a clone handed to a spawned task does
/// not steal the signal from the original.
#[derive(Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<()>,
    received: bool,
}

impl Clone for DelegatedShutdownListener {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            received: self.received,
        }
    }
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver,
            received: false,
        }
    }

    /// Point in time check for whether the shutdown signal has been sent. Once this returns
    /// true it will keep returning true.
    pub fn should_shutdown(&mut self) -> bool {
        if self.received {
            return true;
        }

        self.received = match self.receiver.try_recv() {
            Ok(_) => true,
            Err(TryRecvError::Closed) => true,
            // Lagged still means a signal was sent at some point.
            Err(TryRecvError::Lagged(_)) => true,
            Err(TryRecvError::Empty) => false,
        };

        self.received
    }

    /// Wait for the shutdown signal. Safe to race against other futures so that the signal
    /// can cancel work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        if self.received {
            return;
        }

        match self.receiver.recv().await {
            Ok(_) => self.received = true,
            Err(e) => {
                // The sender dropping also means the run is over.
                log::trace!("Shutdown channel closed: {e:?}");
                self.received = true;
            }
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
