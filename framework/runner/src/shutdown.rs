use gust_core::prelude::ShutdownHandle;
use tokio::signal;

/// Listen for Ctrl-C and translate it into a run-level shutdown, so an operator can cut a
/// run short and still get a drained pool and a final report.
pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> anyhow::Result<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e:?}");
            return;
        }
        println!("Received shutdown signal, shutting down...");
        listener_handle.shutdown();
    });

    Ok(handle)
}
