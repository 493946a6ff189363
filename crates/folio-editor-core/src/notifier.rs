//! Fan-out of mutated paths to independent listeners.

use folio_common::{Subject, Subscription};
use tokio::sync::mpsc;

use crate::path::Path;

/// Publishes the path of every mutation applied to a document's store.
///
/// Listeners (validators, autosave, UI) subscribe independently. Remote edits
/// applied by the realtime strategy are published the same way as local ones.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    subject: Subject<Path>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `path`. Returns the number of live subscribers.
    pub fn notify(&self, path: Path) -> usize {
        tracing::trace!(%path, "change");
        self.subject.emit(path)
    }

    /// Every change from now on.
    pub fn subscribe(&self) -> ChangeStream {
        ChangeStream {
            rx: self.subject.subscribe(),
            scope: None,
        }
    }

    /// Changes overlapping `scope`: the scope itself, its ancestors, and its
    /// descendants.
    pub fn subscribe_to(&self, scope: Path) -> ChangeStream {
        ChangeStream {
            rx: self.subject.subscribe(),
            scope: Some(scope),
        }
    }

    /// Run `f` for every change until the returned handle is dropped.
    pub fn listen(&self, mut f: impl FnMut(Path) + Send + 'static) -> Subscription {
        let mut stream = self.subscribe();
        Subscription::spawn(async move {
            while let Some(path) = stream.recv().await {
                f(path);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subject.subscriber_count()
    }

    /// End every stream. Used on document teardown.
    pub fn close(&self) {
        self.subject.close();
    }
}

/// Receiving half of a [`ChangeNotifier`] subscription.
#[derive(Debug)]
pub struct ChangeStream {
    rx: mpsc::UnboundedReceiver<Path>,
    scope: Option<Path>,
}

impl ChangeStream {
    fn wanted(&self, path: &Path) -> bool {
        self.scope.as_ref().is_none_or(|scope| scope.overlaps(path))
    }

    /// Next matching change, or `None` once the notifier is closed.
    pub async fn recv(&mut self) -> Option<Path> {
        loop {
            let path = self.rx.recv().await?;
            if self.wanted(&path) {
                return Some(path);
            }
        }
    }

    /// Next matching change already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<Path> {
        while let Ok(path) = self.rx.try_recv() {
            if self.wanted(&path) {
                return Some(path);
            }
        }
        None
    }
}
