use std::sync::Arc;

/// Status messages the core pushes at the host UI. The core calls the
/// sink on every outcome but never depends on what the host renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiNotice {
    /// Loading/disabled state toggle.
    Busy(bool),
    /// The active page produced no readable content.
    NoContent,
    Status(String),
    Error(String),
}

/// One-way notification sink implemented by the host.
pub trait UiNotifier: Send + Sync {
    fn notify(&self, notice: UiNotice);
}

/// Sink that drops every notice, for headless hosts and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl UiNotifier for NullNotifier {
    #[inline]
    fn notify(&self, _notice: UiNotice) {}
}

/// Raises the busy state on construction and clears it on drop, so the
/// UI can never be left stuck in a loading state by an early return.
pub struct BusyGuard {
    notifier: Arc<dyn UiNotifier>,
}

impl BusyGuard {
    #[inline]
    pub fn engage(notifier: Arc<dyn UiNotifier>) -> Self {
        notifier.notify(UiNotice::Busy(true));
        Self { notifier }
    }
}

impl Drop for BusyGuard {
    #[inline]
    fn drop(&mut self) {
        self.notifier.notify(UiNotice::Busy(false));
    }
}
