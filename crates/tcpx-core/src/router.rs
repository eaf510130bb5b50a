use crate::error::{DispatchError, HandlerError};
use crate::request::{MessageId, Request};
use core::sync::atomic::Ordering;
use crossbeam_epoch::{self as epoch, Atomic, Owned};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Business logic bound to one message id.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: &Request) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Request) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, request: &Request) -> Result<(), HandlerError> {
        self(request)
    }
}

type Routes = HashMap<MessageId, Arc<dyn Handler>>;

/// Message id to handler table.
///
/// ## Shadow-Swap
/// Registration clones the current map, inserts, and swaps the new map in
/// through an epoch-protected pointer. Dispatch never takes a lock, and a table
/// swapped out mid-dispatch is reclaimed only after every reader unpins.
pub struct RouterTable {
    routes: Atomic<Routes>,
    writer: Mutex<()>,
}

impl RouterTable {
    pub fn new() -> Self {
        Self {
            routes: Atomic::new(HashMap::new()),
            writer: Mutex::new(()),
        }
    }

    /// Registers `handler` for `msg_id`. Last write wins.
    pub fn add(&self, msg_id: impl Into<MessageId>, handler: impl Handler) {
        self.add_shared(msg_id.into(), Arc::new(handler));
    }

    pub fn add_shared(&self, msg_id: MessageId, handler: Arc<dyn Handler>) {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let guard = epoch::pin();
        let current = self.routes.load(Ordering::Acquire, &guard);

        // # Safety: `current` is protected by `guard`, and writers are serialised
        // by `writer`, so no other thread can retire it while we clone it.
        let mut next = unsafe { current.as_ref() }.cloned().unwrap_or_default();
        if next.insert(msg_id, handler).is_some() {
            tracing::debug!(msg_id = %msg_id, "router: handler replaced");
        }

        let old = self.routes.swap(Owned::new(next), Ordering::AcqRel, &guard);
        unsafe {
            if !old.is_null() {
                guard.defer_destroy(old);
            }
        }
    }

    pub fn resolve(&self, msg_id: MessageId) -> Option<Arc<dyn Handler>> {
        let guard = epoch::pin();
        let routes = self.routes.load(Ordering::Acquire, &guard);
        // # Safety: the pinned guard keeps the map alive for this read.
        unsafe { routes.as_ref() }?.get(&msg_id).cloned()
    }

    pub fn contains(&self, msg_id: impl Into<MessageId>) -> bool {
        self.resolve(msg_id.into()).is_some()
    }

    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let routes = self.routes.load(Ordering::Acquire, &guard);
        unsafe { routes.as_ref() }.map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves and runs the handler for `request` on the calling thread.
    ///
    /// Handler failures, including panics, come back as values.
    pub fn dispatch(&self, request: &Request) -> Result<(), DispatchError> {
        let msg_id = request.msg_id();
        let handler = self.resolve(msg_id).ok_or(DispatchError::NoHandler(msg_id))?;

        match catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(DispatchError::Handler { msg_id, source }),
            Err(_) => Err(DispatchError::HandlerPanicked(msg_id)),
        }
    }
}

impl Default for RouterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RouterTable {
    fn drop(&mut self) {
        let guard = epoch::pin();
        let old = self.routes.swap(epoch::Shared::null(), Ordering::AcqRel, &guard);
        unsafe {
            if !old.is_null() {
                guard.defer_destroy(old);
            }
        }
    }
}
