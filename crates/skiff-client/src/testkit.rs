//! In-memory scripted cluster for tests.
//!
//! `ScriptedClient` keeps a map of objects and answers `get`/`list` from
//! it, unless a response sequence was scripted for that key, in which case
//! the sequence is consumed first. A successful scripted `get` also becomes
//! the stored object, so the last scripted state sticks. Calls, follow-open
//! attempts and close-handle invocations are counted for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::stream;
use skiff_core::{Event, Labels};
use tokio::sync::mpsc;

use crate::client::{Applied, ClientFuture, CloseHandle, LogFollower, ResourceClient};
use crate::error::{ClientError, ClientResult};
use crate::resource::{Resource, ResourceKind};

type Key = (ResourceKind, String);

#[derive(Default)]
struct State {
    objects: HashMap<Key, Resource>,
    get_scripts: HashMap<Key, VecDeque<ClientResult<Resource>>>,
    list_scripts: HashMap<ResourceKind, VecDeque<ClientResult<Vec<Resource>>>>,
    events: HashMap<String, Vec<Event>>,
    fail_events: bool,
    get_calls: HashMap<Key, usize>,
    list_calls: HashMap<ResourceKind, usize>,
    created: Vec<Resource>,
    deleted: Vec<Key>,
    follow_failures: HashMap<String, (usize, Option<u16>)>,
    follow_attempts: HashMap<String, usize>,
    preloaded: HashMap<String, Vec<String>>,
    log_senders: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
    closes: HashMap<String, usize>,
}

#[derive(Clone)]
pub struct ScriptedClient {
    namespace: String,
    state: Arc<Mutex<State>>,
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::with_namespace("test")
    }

    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object as if it already existed in the cluster.
    pub fn insert(&self, resource: impl Into<Resource>) {
        let resource = resource.into();
        let key = (resource.kind(), resource.name().to_string());
        self.state().objects.insert(key, resource);
    }

    pub fn remove(&self, kind: ResourceKind, name: &str) {
        self.state().objects.remove(&(kind, name.to_string()));
    }

    pub fn object(&self, kind: ResourceKind, name: &str) -> Option<Resource> {
        self.state().objects.get(&(kind, name.to_string())).cloned()
    }

    /// Queue responses for successive `get(kind, name)` calls.
    pub fn script_get<I>(&self, kind: ResourceKind, name: &str, responses: I)
    where
        I: IntoIterator<Item = ClientResult<Resource>>,
    {
        self.state()
            .get_scripts
            .entry((kind, name.to_string()))
            .or_default()
            .extend(responses);
    }

    /// Queue responses for successive `list(kind, _)` calls.
    pub fn script_list<I>(&self, kind: ResourceKind, responses: I)
    where
        I: IntoIterator<Item = ClientResult<Vec<Resource>>>,
    {
        self.state()
            .list_scripts
            .entry(kind)
            .or_default()
            .extend(responses);
    }

    pub fn set_events(&self, uid: &str, events: Vec<Event>) {
        self.state().events.insert(uid.to_string(), events);
    }

    pub fn fail_events(&self, fail: bool) {
        self.state().fail_events = fail;
    }

    /// Make the next `times` follow-open attempts for `pod` fail with a
    /// transport error.
    pub fn fail_follow(&self, pod: &str, times: usize) {
        self.state()
            .follow_failures
            .insert(pod.to_string(), (times, None));
    }

    /// Make the next `times` follow-open attempts for `pod` fail with an
    /// API status, as the cluster answers while a container is starting.
    pub fn fail_follow_with_status(&self, pod: &str, times: usize, status: u16) {
        self.state()
            .follow_failures
            .insert(pod.to_string(), (times, Some(status)));
    }

    /// Lines delivered to every follower of `pod` as soon as it opens.
    pub fn preload_lines(&self, pod: &str, lines: &[&str]) {
        self.state()
            .preloaded
            .entry(pod.to_string())
            .or_default()
            .extend(lines.iter().map(|l| l.to_string()));
    }

    /// Deliver a line to every open follower of `pod`. Returns how many
    /// followers received it.
    pub fn push_line(&self, pod: &str, line: &str) -> usize {
        let mut state = self.state();
        let Some(senders) = state.log_senders.get_mut(pod) else {
            return 0;
        };
        senders.retain(|tx| tx.send(line.to_string()).is_ok());
        senders.len()
    }

    /// End every open follower of `pod`, as when its container exits.
    pub fn end_logs(&self, pod: &str) {
        self.state().log_senders.remove(pod);
    }

    pub fn get_calls(&self, kind: ResourceKind, name: &str) -> usize {
        self.state()
            .get_calls
            .get(&(kind, name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn list_calls(&self, kind: ResourceKind) -> usize {
        self.state().list_calls.get(&kind).copied().unwrap_or(0)
    }

    pub fn follow_attempts(&self, pod: &str) -> usize {
        self.state().follow_attempts.get(pod).copied().unwrap_or(0)
    }

    pub fn close_count(&self, pod: &str) -> usize {
        self.state().closes.get(pod).copied().unwrap_or(0)
    }

    pub fn total_closes(&self) -> usize {
        self.state().closes.values().sum()
    }

    pub fn created(&self) -> Vec<Resource> {
        self.state().created.clone()
    }

    pub fn deleted(&self) -> Vec<(ResourceKind, String)> {
        self.state().deleted.clone()
    }

    fn do_create(&self, resource: Resource, force: bool) -> ClientResult<Applied<Resource>> {
        let mut state = self.state();
        let key = (resource.kind(), resource.name().to_string());
        if let Some(existing) = state.objects.get(&key) {
            if force {
                return Ok(Applied::Adopted(existing.clone()));
            }
            return Err(ClientError::Conflict {
                kind: key.0,
                name: key.1,
            });
        }
        state.created.push(resource.clone());
        state.objects.insert(key, resource.clone());
        Ok(Applied::Created(resource))
    }

    fn do_get(&self, kind: ResourceKind, name: &str) -> ClientResult<Resource> {
        let mut state = self.state();
        let key = (kind, name.to_string());
        *state.get_calls.entry(key.clone()).or_default() += 1;

        if let Some(next) = state.get_scripts.get_mut(&key).and_then(VecDeque::pop_front) {
            if let Ok(resource) = &next {
                state.objects.insert(key, resource.clone());
            }
            return next;
        }
        state
            .objects
            .get(&key)
            .cloned()
            .ok_or(ClientError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    fn do_list(&self, kind: ResourceKind, selector: &Labels) -> ClientResult<Vec<Resource>> {
        let mut state = self.state();
        *state.list_calls.entry(kind).or_default() += 1;

        if let Some(next) = state.list_scripts.get_mut(&kind).and_then(VecDeque::pop_front) {
            return next;
        }
        let mut matches: Vec<Resource> = state
            .objects
            .iter()
            .filter(|((k, _), r)| {
                *k == kind
                    && selector
                        .iter()
                        .all(|(lk, lv)| {
                            r.metadata().labels.as_ref().and_then(|l| l.get(lk)) == Some(lv)
                        })
            })
            .map(|(_, r)| r.clone())
            .collect();
        matches.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(matches)
    }

    fn do_delete(&self, kind: ResourceKind, name: &str) -> ClientResult<()> {
        let mut state = self.state();
        let key = (kind, name.to_string());
        if state.objects.remove(&key).is_none() {
            return Err(ClientError::NotFound {
                kind,
                name: name.to_string(),
            });
        }
        state.deleted.push(key);
        Ok(())
    }

    fn do_follow(&self, pod: &str) -> ClientResult<LogFollower> {
        let mut state = self.state();
        *state.follow_attempts.entry(pod.to_string()).or_default() += 1;

        if let Some((remaining, status)) = state.follow_failures.get_mut(pod) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(match status {
                    Some(status) => ClientError::Status {
                        status: *status,
                        reason: "BadRequest".to_string(),
                        message: format!(
                            "container in pod {pod} is waiting to start: ContainerCreating"
                        ),
                    },
                    None => ClientError::Transport(format!("scripted follow failure for {pod}")),
                });
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for line in state.preloaded.get(pod).into_iter().flatten() {
            let _ = tx.send(line.clone());
        }
        state
            .log_senders
            .entry(pod.to_string())
            .or_default()
            .push(tx);

        let lines = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|line| (Ok(line), rx))
        });
        let counter = Arc::clone(&self.state);
        let pod_name = pod.to_string();
        let close = CloseHandle::new(move || {
            let mut state = counter.lock().unwrap_or_else(PoisonError::into_inner);
            *state.closes.entry(pod_name).or_default() += 1;
        });
        Ok(LogFollower::new(Box::pin(lines), close))
    }

    fn do_events(&self, uid: &str) -> ClientResult<Vec<Event>> {
        let state = self.state();
        if state.fail_events {
            return Err(ClientError::Transport("scripted event failure".to_string()));
        }
        Ok(state.events.get(uid).cloned().unwrap_or_default())
    }
}

impl ResourceClient for ScriptedClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn create<'a>(&'a self, resource: Resource, force: bool) -> ClientFuture<'a, Applied<Resource>> {
        Box::pin(async move { self.do_create(resource, force) })
    }

    fn get<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, Resource> {
        Box::pin(async move { self.do_get(kind, name) })
    }

    fn list<'a>(
        &'a self,
        kind: ResourceKind,
        selector: &'a Labels,
    ) -> ClientFuture<'a, Vec<Resource>> {
        Box::pin(async move { self.do_list(kind, selector) })
    }

    fn delete<'a>(&'a self, kind: ResourceKind, name: &'a str) -> ClientFuture<'a, ()> {
        Box::pin(async move { self.do_delete(kind, name) })
    }

    fn follow_log<'a>(&'a self, pod: &'a str) -> ClientFuture<'a, LogFollower> {
        Box::pin(async move { self.do_follow(pod) })
    }

    fn list_events<'a>(&'a self, uid: &'a str) -> ClientFuture<'a, Vec<Event>> {
        Box::pin(async move { self.do_events(uid) })
    }
}
