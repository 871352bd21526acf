//! Memory-pressure signals that make the engine drop its session.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Severity reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Warning,
    Critical,
}

/// A stream of memory-pressure notifications.
#[async_trait]
pub trait PressureSource: Send + 'static {
    /// Wait for the next signal; `None` once the source is closed.
    async fn next_signal(&mut self) -> Option<MemoryPressure>;
}

#[async_trait]
impl PressureSource for mpsc::Receiver<MemoryPressure> {
    async fn next_signal(&mut self) -> Option<MemoryPressure> {
        self.recv().await
    }
}

#[async_trait]
impl PressureSource for mpsc::UnboundedReceiver<MemoryPressure> {
    async fn next_signal(&mut self) -> Option<MemoryPressure> {
        self.recv().await
    }
}
