use tokio::sync::watch;

/// The receiving end of the server's shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    pub fn is_set(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Waits until shutdown is requested. Returns immediately if it already was, or if the flag's
    /// sender is gone.
    pub async fn wait(&mut self) {
        loop {
            let is_set = *self.receiver.borrow_and_update();
            if is_set {
                return;
            }

            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}
