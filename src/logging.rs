use tracing::Dispatch;

/// Explicit log destination handed to each client and database.
///
/// Events emitted inside [`LogSink::scope`] go to the wrapped dispatcher.
/// A default (empty) sink swallows them instead of falling back to the
/// process-wide subscriber.
#[derive(Clone, Default)]
pub struct LogSink {
    dispatch: Option<Dispatch>,
}

impl LogSink {
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Sink that discards every event.
    pub fn none() -> Self {
        Self::default()
    }

    /// Capture the dispatcher active for the caller right now.
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(Dispatch::clone))
    }

    pub fn is_enabled(&self) -> bool {
        self.dispatch.is_some()
    }

    /// Run `f` with this sink as the default dispatcher.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => tracing::dispatcher::with_default(&Dispatch::none(), f),
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl From<Dispatch> for LogSink {
    fn from(dispatch: Dispatch) -> Self {
        Self::new(dispatch)
    }
}
