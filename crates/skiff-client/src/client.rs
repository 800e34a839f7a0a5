//! The resource client trait.
//!
//! Methods return boxed futures so the trait stays dyn-compatible and can
//! be shared as `Arc<dyn ResourceClient>` between the coordinator, the log
//! relay and the broker handlers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;
use skiff_core::{Event, Labels};

use crate::error::ClientResult;
use crate::resource::{Resource, ResourceKind};

/// Boxed future returned by every [`ResourceClient`] method.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = ClientResult<T>> + Send + 'a>>;

/// Lines read from a followed log, without their trailing newline.
pub type LineStream = Pin<Box<dyn Stream<Item = ClientResult<String>> + Send>>;

/// Outcome of a create call.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied<T> {
    /// The object did not exist and was created.
    Created(T),
    /// The object already existed and `force` was set; it is returned as found.
    Adopted(T),
}

impl<T> Applied<T> {
    pub fn into_inner(self) -> T {
        match self {
            Applied::Created(t) | Applied::Adopted(t) => t,
        }
    }

    pub fn is_adopted(&self) -> bool {
        matches!(self, Applied::Adopted(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Applied<U> {
        match self {
            Applied::Created(t) => Applied::Created(f(t)),
            Applied::Adopted(t) => Applied::Adopted(f(t)),
        }
    }
}

/// Releases the connection behind a followed log. Runs at most once.
pub struct CloseHandle(Box<dyn FnOnce() + Send>);

impl CloseHandle {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn close(self) {
        (self.0)()
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CloseHandle")
    }
}

/// An open log stream of one pod together with its close handle.
pub struct LogFollower {
    pub lines: LineStream,
    pub close: CloseHandle,
}

impl LogFollower {
    pub fn new(lines: LineStream, close: CloseHandle) -> Self {
        Self { lines, close }
    }

    pub fn into_parts(self) -> (LineStream, CloseHandle) {
        (self.lines, self.close)
    }
}

impl fmt::Debug for LogFollower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFollower").finish_non_exhaustive()
    }
}

/// Access to cluster resources of the supported kinds.
///
/// Namespaced kinds are addressed within the client's own namespace.
pub trait ResourceClient: Send + Sync {
    /// Namespace this client operates in.
    fn namespace(&self) -> &str;

    /// Create an object. On a name collision, `force` returns the existing
    /// object as [`Applied::Adopted`]; without it the call fails with
    /// [`ClientError::Conflict`](crate::ClientError::Conflict).
    fn create<'a>(&'a self, resource: Resource, force: bool) -> ClientFuture<'a, Applied<Resource>>;

    fn get<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Resource>;

    /// List objects whose labels contain every entry of `selector`.
    fn list<'a>(&'a self, kind: ResourceKind, selector: &'a Labels)
    -> ClientFuture<'a, Vec<Resource>>;

    fn delete<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, ()>;

    /// Open a follow-mode log stream for a pod.
    fn follow_log<'a>(&'a self, pod: &'a str) -> ClientFuture<'a, LogFollower>;

    /// Events whose involved object has the given uid, oldest first.
    fn list_events<'a>(&'a self, uid: &'a str) -> ClientFuture<'a, Vec<Event>>;
}
