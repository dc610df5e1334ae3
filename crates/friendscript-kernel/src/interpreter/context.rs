//! Execution contexts and the observers that watch them.
//!
//! The evaluator keeps a chain of [`Context`]s mirroring the statements it is
//! inside of. Around every command it broadcasts the innermost context to the
//! registered observers, once when the command starts and once when it ends.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ast::Span;

/// Where a context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Finished,
    Failed,
}

/// Metadata about one statement under evaluation.
#[derive(Debug, Clone)]
pub struct Context {
    pub id: u64,
    pub parent: Option<u64>,
    /// Statement kind (`command`, `loop`, ...).
    pub kind: &'static str,
    /// Human label: the command's qualified name, or the kind again.
    pub label: String,
    pub span: Span,
    /// Source text of the statement.
    pub snippet: String,
    pub state: ContextState,
    pub started_at: Instant,
    pub elapsed: Option<Duration>,
    pub error: Option<String>,
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}`", self.label, self.snippet)?;
        if let Some(elapsed) = self.elapsed {
            write!(f, " ({elapsed:?})")?;
        }
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}

/// Handle returned by [`ObserverRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&Context) + Send + Sync>;

/// Callbacks notified of context updates.
///
/// Cheap to clone; clones share the same registry, so a host can hand one to
/// another thread and (un)subscribe while a program runs. Observers are called
/// with the registry locked and must not subscribe or unsubscribe from inside
/// the callback.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<Mutex<Vec<(ObserverId, Observer)>>>,
    next_id: Arc<AtomicU64>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `context` to every observer, in subscription order.
    pub fn broadcast(&self, context: &Context) {
        let observers = self.observers.lock();
        for (_, observer) in observers.iter() {
            observer(context);
        }
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(label: &str) -> Context {
        Context {
            id: 1,
            parent: None,
            kind: "command",
            label: label.to_string(),
            span: Span::default(),
            snippet: format!("{label} 1"),
            state: ContextState::Running,
            started_at: Instant::now(),
            elapsed: None,
            error: None,
        }
    }

    #[test]
    fn observers_receive_broadcasts_until_unsubscribed() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = registry.subscribe(move |ctx| sink.lock().push(ctx.label.clone()));

        registry.broadcast(&context("put"));
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.broadcast(&context("log"));

        assert_eq!(*seen.lock(), vec!["put".to_string()]);
        assert!(registry.is_empty());
    }

    #[test]
    fn clones_share_subscriptions() {
        let registry = ObserverRegistry::new();
        let handle = registry.clone();
        std::thread::spawn(move || {
            handle.subscribe(|_| {});
        })
        .join()
        .expect("thread");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn display_includes_error() {
        let mut ctx = context("file::read");
        ctx.error = Some("missing".into());
        assert_eq!(ctx.to_string(), "file::read `file::read 1`: missing");
    }
}
