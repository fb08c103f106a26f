//! Dispatch table mapping lifecycle events to async handlers.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::context::WorkerContext;
use super::error::WorkerError;
use super::lifecycle::{self, ActivateReport, FetchOutcome, InstallReport};
use crate::http::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Install => "install",
      Self::Activate => "activate",
      Self::Fetch => "fetch",
    })
  }
}

/// An event delivered to the worker by its host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
}

impl WorkerEvent {
  pub fn kind(&self) -> EventKind {
    match self {
      Self::Install => EventKind::Install,
      Self::Activate => EventKind::Activate,
      Self::Fetch(_) => EventKind::Fetch,
    }
  }
}

/// Result of a handler once its pending work has completed.
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Fetched(FetchOutcome),
}

type HandlerFuture = BoxFuture<'static, Result<EventOutcome, WorkerError>>;
type Handler = Arc<dyn Fn(Arc<WorkerContext>, WorkerEvent) -> HandlerFuture + Send + Sync>;

/// Work a handler started for one event. The host must wait on it before
/// treating the event as finished.
pub struct PendingWork {
  kind: EventKind,
  handle: JoinHandle<Result<EventOutcome, WorkerError>>,
}

impl PendingWork {
  pub fn kind(&self) -> EventKind {
    self.kind
  }

  /// Wait for the handler's work to finish.
  pub async fn wait_until(self) -> Result<EventOutcome, WorkerError> {
    match self.handle.await {
      Ok(result) => result,
      Err(e) => Err(WorkerError::Aborted {
        kind: self.kind,
        reason: e.to_string(),
      }),
    }
  }
}

/// Routes events to the handler registered for their kind.
pub struct Dispatcher {
  context: Arc<WorkerContext>,
  handlers: HashMap<EventKind, Handler>,
}

impl Dispatcher {
  /// A dispatcher with no handlers registered.
  pub fn new(context: Arc<WorkerContext>) -> Self {
    Self {
      context,
      handlers: HashMap::new(),
    }
  }

  /// A dispatcher wired to the offline cache manager's handlers.
  pub fn offline_cache(context: Arc<WorkerContext>) -> Self {
    let mut dispatcher = Self::new(context);

    dispatcher.on(EventKind::Install, |ctx, _| async move {
      lifecycle::install(&ctx).await.map(EventOutcome::Installed)
    });
    dispatcher.on(EventKind::Activate, |ctx, _| async move {
      lifecycle::activate(&ctx).await.map(EventOutcome::Activated)
    });
    dispatcher.on(EventKind::Fetch, |ctx, event| async move {
      let WorkerEvent::Fetch(request) = event else {
        return Ok(EventOutcome::Fetched(FetchOutcome::PassThrough));
      };
      lifecycle::fetch(&ctx, request)
        .await
        .map(EventOutcome::Fetched)
    });

    dispatcher
  }

  /// Register `handler` for `kind`, replacing any earlier one.
  pub fn on<F, Fut>(&mut self, kind: EventKind, handler: F)
  where
    F: Fn(Arc<WorkerContext>, WorkerEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<EventOutcome, WorkerError>> + Send + 'static,
  {
    self
      .handlers
      .insert(kind, Arc::new(move |ctx, event| handler(ctx, event).boxed()));
  }

  pub fn context(&self) -> &Arc<WorkerContext> {
    &self.context
  }

  #[cfg(test)]
  pub fn handles(&self, kind: EventKind) -> bool {
    self.handlers.contains_key(&kind)
  }

  /// Start handling `event`. Returns `None` when no handler is registered
  /// for its kind, in which case the host proceeds with its default.
  pub fn dispatch(&self, event: WorkerEvent) -> Option<PendingWork> {
    let kind = event.kind();
    let handler = self.handlers.get(&kind)?;
    let work = handler(Arc::clone(&self.context), event);

    Some(PendingWork {
      kind,
      handle: tokio::spawn(work),
    })
  }
}
