//! The request/response boundary between a store and the REST transport.
//!
//! The transport itself is a black box: a store hands it typed requests
//! through a [`RequestDispatcher`] and is driven with completions through
//! [`super::Store::resolve`]. The trait is intentionally simple; batching,
//! serialization, and retry policy are layered on top by the host
//! application.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::error::MutationError;
use crate::model::{Entity, EntityId};

// ---------------------------------------------------------------------------
// Request identity
// ---------------------------------------------------------------------------

/// Opaque handle correlating a dispatched request with its completion.
///
/// Dispatchers must hand out ids unique within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// A mutation or fetch dispatched to the server.
#[derive(Debug, Clone)]
pub enum EntityRequest<E: Entity> {
    /// Create the record (its id is still temporary).
    Create {
        /// The optimistic draft, carrying its temporary id.
        record: E,
    },
    /// Patch an existing record.
    Update {
        /// Target id.
        id: EntityId,
        /// Fields to change.
        patch: E::Patch,
    },
    /// Delete a record.
    Delete {
        /// Target id.
        id: EntityId,
    },
    /// Re-fetch the canonical record after a conflict.
    Fetch {
        /// Target id.
        id: EntityId,
    },
}

/// Completion of a dispatched request.
///
/// Successful create/update/delete/fetch all return the canonical server
/// record including its revision marker.
pub type RequestOutcome<E> = Result<E, MutationError>;

/// The dispatch seam a store is constructed over.
pub trait RequestDispatcher<E: Entity> {
    /// Hand a request to the transport, returning its correlation id.
    fn dispatch(&mut self, request: EntityRequest<E>) -> RequestId;
}

// ---------------------------------------------------------------------------
// RequestQueue
// ---------------------------------------------------------------------------

/// A dispatcher that queues requests for the application loop to drain.
///
/// This is the default wiring for the single-threaded session model: store
/// methods enqueue, the host loop drains the queue, performs the transport
/// round trip, and feeds the outcome back through `Store::resolve`. Clones
/// share the same queue, so one handle goes into the store and another
/// stays with the loop.
#[derive(Debug)]
pub struct RequestQueue<R> {
    inner: Rc<RefCell<QueueInner<R>>>,
}

#[derive(Debug)]
struct QueueInner<R> {
    next_id: u64,
    queue: VecDeque<(RequestId, R)>,
}

impl<R> RequestQueue<R> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(QueueInner {
                next_id: 0,
                queue: VecDeque::new(),
            })),
        }
    }

    /// Remove and return all queued requests in dispatch order.
    #[must_use]
    pub fn drain(&self) -> Vec<(RequestId, R)> {
        self.inner.borrow_mut().queue.drain(..).collect()
    }

    /// Number of queued, undrained requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }

    pub(crate) fn push(&self, request: R) -> RequestId {
        let mut inner = self.inner.borrow_mut();
        let id = RequestId(inner.next_id);
        inner.next_id += 1;
        inner.queue.push_back((id, request));
        id
    }
}

impl<R> Default for RequestQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for RequestQueue<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Entity> RequestDispatcher<E> for RequestQueue<EntityRequest<E>> {
    fn dispatch(&mut self, request: EntityRequest<E>) -> RequestId {
        self.push(request)
    }
}
