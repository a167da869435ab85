use std::future::Future;

use gust_core::prelude::{ShutdownHandle, ShutdownSignalError};

/// Bridge between client threads and the shared tokio runtime.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is raced against the run-level shutdown signal, so an abort or Ctrl-C
    /// does not leave a client stuck inside a request that will never be answered. A
    /// cancelled call returns a [ShutdownSignalError].
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Submit async code to run in the background. There is no guarantee the run waits for
    /// it before shutting down; use [Executor::execute_in_place] inside behaviour hooks so
    /// the iteration's work completes before the iteration does.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}
