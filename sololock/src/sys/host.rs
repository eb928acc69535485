//! Signal listeners and process exit for the running process.

use futures::future::BoxFuture;
use futures::{FutureExt, select};
use log::{debug, info};
use std::io;
use std::pin::pin;
use tokio::signal::unix::{SignalKind, signal};

use super::RuntimeHost;
use crate::api::models::ShutdownSignal;

/// Binds the coordinator to the real process: SIGINT/SIGTERM and `exit`.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsHost;

impl OsHost {
    /// Creates a host bound to the current process.
    pub fn new() -> Self {
        Self
    }
}

impl RuntimeHost for OsHost {
    fn listen(&self) -> io::Result<BoxFuture<'static, ShutdownSignal>> {
        // Registration happens here, before the future is ever polled.
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        debug!("Installed SIGINT/SIGTERM listeners");

        Ok(async move {
            let mut interrupted = pin!(interrupt.recv().fuse());
            let mut terminated = pin!(terminate.recv().fuse());

            let received = select! {
                _ = interrupted => ShutdownSignal::Interrupt,
                _ = terminated => ShutdownSignal::Terminate,
            };
            info!("Received {received}");
            received
        }
        .boxed())
    }

    fn request_exit(&self, code: i32) {
        debug!("Exiting with status {code}");
        std::process::exit(code);
    }
}
