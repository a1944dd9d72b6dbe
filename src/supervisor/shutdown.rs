//! Cooperative shutdown
//!
//! A `Shutdown` owns the request side; any number of `ShutdownToken`s observe
//! it. The supervision loop checks its token between services and races it
//! against the inter-cycle sleep, so an in-flight service always completes.

use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Terminate,
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGQUIT (Ctrl+\)
    Quit,
    /// Requested from code (tests, `--once`)
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Quit => write!(f, "SIGQUIT"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// Request side of the shutdown channel
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<Option<ShutdownSignal>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// New observer of this shutdown
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Request shutdown; the first signal wins
    pub fn request(&self, signal: ShutdownSignal) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            info!("Shutdown requested ({})", signal);
            *current = Some(signal);
            true
        });
    }

    pub fn is_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Observer side of the shutdown channel
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    pub fn is_requested(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn signal(&self) -> Option<ShutdownSignal> {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested. Never resolves if the `Shutdown`
    /// was dropped without a request.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|s| s.is_some()).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Route process signals into `shutdown`
pub fn install_signal_handlers(shutdown: std::sync::Arc<Shutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, sig) in [
            (SignalKind::terminate(), ShutdownSignal::Terminate),
            (SignalKind::interrupt(), ShutdownSignal::Interrupt),
            (SignalKind::quit(), ShutdownSignal::Quit),
        ] {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to install {} handler: {}", sig, e);
                    continue;
                }
            };
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if stream.recv().await.is_some() {
                    warn!("Received {}", sig);
                    shutdown.request(sig);
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Received Ctrl+C");
                    shutdown.request(ShutdownSignal::Interrupt);
                }
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        });
    }
}
