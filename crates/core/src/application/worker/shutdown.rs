// Stop signal shared by the worker and scheduler loops

use tokio::sync::watch;

/// Receiving half; cheap to clone into every loop that must stop together
#[derive(Clone)]
pub struct ShutdownToken {
    stopped: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Resolve once the stop was signalled, or at once if it already was.
    /// A dropped sender counts as a stop.
    pub async fn wait(&mut self) {
        let _ = self.stopped.wait_for(|stopped| *stopped).await;
    }
}

pub struct ShutdownSender {
    stop: watch::Sender<bool>,
}

impl ShutdownSender {
    pub fn shutdown(&self) {
        self.stop.send_replace(true);
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (stop, stopped) = watch::channel(false);
    (ShutdownSender { stop }, ShutdownToken { stopped })
}
