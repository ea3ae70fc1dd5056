use super::{BootstrapError, Storage, UpdatedObject, WatchStream};
use crate::{
    core::{
        metadata::{ListMeta, TypeMeta},
        params::{DeleteParams, GetParams, ListParams, PostParams, Preconditions, WatchParams},
        response::StatusCause,
        watch::{Bookmark, BookmarkMeta},
        Context, Error, GroupResource, ObjectList, Resource, ResourceExt, Result, WatchEvent,
    },
    predicate::SelectionPredicate,
    strategy::Strategy,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures::StreamExt;
use parking_lot::RwLock;
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    ops::Bound,
    sync::Arc,
    time::Duration,
};
use tokio::sync::broadcast::{self, error::RecvError};

const DEFAULT_WATCH_CAPACITY: usize = 1024;
const DEFAULT_HISTORY_WINDOW: usize = 1000;
const DEFAULT_MAX_PAGE_SIZE: u32 = 500;

// Consonants and digits only, so generated suffixes never spell words
const NAME_SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const NAME_SUFFIX_LEN: usize = 5;
const MAX_NAME_LEN: usize = 253;

const MODIFIED_CONFLICT: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

/// Position of an object in the store
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
struct ObjectKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A committed change, as retained for watch resumption and fanned out to live watches
#[derive(Debug)]
struct Change<K> {
    revision: u64,
    kind: ChangeKind,
    object: K,
    previous: Option<K>,
}

struct State<K> {
    objects: BTreeMap<ObjectKey, K>,
    revision: u64,
    history: VecDeque<Arc<Change<K>>>,
    /// Revision of the newest change evicted from `history`
    compacted: u64,
}

/// Serialized form of a list continue token
#[derive(Serialize, Deserialize)]
struct ContinueToken {
    rv: u64,
    start: ObjectKey,
}

impl ContinueToken {
    fn encode(&self) -> Result<String> {
        let raw = serde_json::to_vec(self).map_err(Error::internal)?;
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    fn decode(token: &str) -> Result<Self> {
        let invalid = |e: &dyn fmt::Display| Error::BadRequest(format!("continue key is not valid: {e}"));
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|e| invalid(&e))?;
        serde_json::from_slice(&raw).map_err(|e| invalid(&e))
    }
}

/// Configures and validates a [`MemoryStore`]
pub struct StoreBuilder<K> {
    resource: GroupResource,
    strategy: Option<Strategy<K>>,
    update_strategy: Option<Strategy<K>>,
    watch_capacity: usize,
    history_window: usize,
    max_page_size: u32,
}

impl<K: Resource + 'static> Default for StoreBuilder<K> {
    fn default() -> Self {
        Self {
            resource: K::group_resource(),
            strategy: None,
            update_strategy: None,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl<K: Resource + 'static> StoreBuilder<K> {
    /// A builder for the resource of `K` with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a different resource name than the one `K` declares
    #[must_use]
    pub fn resource(mut self, resource: GroupResource) -> Self {
        self.resource = resource;
        self
    }

    /// Strategy for create, update and selection
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy<K>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// A separate strategy for updates
    #[must_use]
    pub fn update_strategy(mut self, strategy: Strategy<K>) -> Self {
        self.update_strategy = Some(strategy);
        self
    }

    /// How many changes a live watch may fall behind before it is terminated
    #[must_use]
    pub fn watch_capacity(mut self, capacity: usize) -> Self {
        self.watch_capacity = capacity;
        self
    }

    /// How many past changes are kept for watches resuming from a resource version
    #[must_use]
    pub fn history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Upper bound on the page size of a limited list
    #[must_use]
    pub fn max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size;
        self
    }

    /// Validate the settings and create the store
    pub fn build(self) -> Result<MemoryStore<K>, BootstrapError> {
        if self.resource.is_empty() {
            return Err(BootstrapError::MissingResource { kind: K::KIND });
        }
        let zero = |setting| BootstrapError::ZeroSetting {
            resource: self.resource.clone(),
            setting,
        };
        if self.watch_capacity == 0 {
            return Err(zero("watchCapacity"));
        }
        if self.history_window == 0 {
            return Err(zero("historyWindow"));
        }
        if self.max_page_size == 0 {
            return Err(zero("maxPageSize"));
        }
        let strategy = self.strategy.unwrap_or_default();
        let (events, _) = broadcast::channel(self.watch_capacity);
        Ok(MemoryStore {
            update_strategy: self.update_strategy.unwrap_or_else(|| strategy.clone()),
            strategy,
            resource: self.resource,
            state: Arc::new(RwLock::new(State {
                objects: BTreeMap::new(),
                revision: 0,
                history: VecDeque::new(),
                compacted: 0,
            })),
            events,
            history_window: self.history_window,
            max_page_size: self.max_page_size,
        })
    }
}

/// An in-process [`Storage`] with a single global resource version counter
///
/// Every committed change bumps the counter, is retained in a bounded history, and is
/// fanned out to live watches. Clones share the same objects.
pub struct MemoryStore<K> {
    resource: GroupResource,
    strategy: Strategy<K>,
    update_strategy: Strategy<K>,
    state: Arc<RwLock<State<K>>>,
    events: broadcast::Sender<Arc<Change<K>>>,
    history_window: usize,
    max_page_size: u32,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            strategy: self.strategy.clone(),
            update_strategy: self.update_strategy.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            history_window: self.history_window,
            max_page_size: self.max_page_size,
        }
    }
}

impl<K> fmt::Debug for MemoryStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("resource", &self.resource)
            .field("history_window", &self.history_window)
            .field("max_page_size", &self.max_page_size)
            .finish_non_exhaustive()
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// A view of the same objects that applies `strategy` to updates
    ///
    /// Used to serve a subresource that shares the main resource's storage.
    #[must_use]
    pub fn with_update_strategy(&self, strategy: Strategy<K>) -> Self {
        Self {
            update_strategy: strategy,
            ..self.clone()
        }
    }

    /// The latest committed resource version
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Number of live watches
    pub fn watcher_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn key(&self, ctx: &Context, name: &str) -> ObjectKey {
        ObjectKey {
            namespace: if K::NAMESPACED {
                ctx.namespace().map(String::from)
            } else {
                None
            },
            name: name.into(),
        }
    }

    fn in_scope(&self, ctx: &Context, key: &ObjectKey) -> bool {
        match ctx.namespace() {
            Some(ns) if K::NAMESPACED => key.namespace.as_deref() == Some(ns),
            _ => true,
        }
    }

    fn invalid(&self, name: &str, causes: Vec<StatusCause>) -> Error {
        Error::invalid(&self.resource, name, causes)
    }

    /// Record a change at the next revision, stamping that revision on the object
    fn commit(&self, state: &mut State<K>, kind: ChangeKind, mut object: K, previous: Option<K>) -> K {
        state.revision += 1;
        let revision = state.revision;
        object.meta_mut().resource_version = Some(revision.to_string());
        let key = ObjectKey {
            namespace: object.namespace(),
            name: object.name_any(),
        };
        match kind {
            ChangeKind::Deleted => {
                state.objects.remove(&key);
            }
            ChangeKind::Added | ChangeKind::Modified => {
                state.objects.insert(key, object.clone());
            }
        }
        let change = Arc::new(Change {
            revision,
            kind,
            object: object.clone(),
            previous,
        });
        state.history.push_back(change.clone());
        while state.history.len() > self.history_window {
            if let Some(evicted) = state.history.pop_front() {
                state.compacted = evicted.revision;
            }
        }
        // No receivers is not an error; nobody is watching
        let _ = self.events.send(change);
        tracing::trace!(resource = %self.resource, revision, ?kind, "committed change");
        object
    }

    /// Create path shared by `create` and updates that are allowed to create
    fn insert_new(&self, state: &mut State<K>, ctx: &Context, mut obj: K, dry_run: bool) -> Result<K> {
        if K::NAMESPACED {
            let namespace = match (ctx.namespace(), obj.namespace()) {
                (Some(req), Some(body)) if req != body => {
                    return Err(Error::BadRequest(
                        "the namespace of the provided object does not match the namespace sent on the request"
                            .into(),
                    ))
                }
                (Some(req), _) => req.to_string(),
                (None, Some(body)) => body,
                (None, None) => return Err(Error::BadRequest("a namespace is required".into())),
            };
            obj.meta_mut().namespace = Some(namespace);
        } else {
            obj.meta_mut().namespace = None;
        }

        self.strategy.prepare_for_create(ctx, &mut obj);
        {
            let meta = obj.meta_mut();
            meta.uid = None;
            meta.resource_version = None;
            meta.generation = Some(1);
            if meta.name.as_deref().unwrap_or_default().is_empty() {
                if let Some(prefix) = meta.generate_name.as_deref().filter(|p| !p.is_empty()) {
                    meta.name = Some(generate_name(prefix));
                }
            }
        }

        let name = obj.name_any();
        let mut causes = validate_name(obj.meta().name.as_deref().unwrap_or_default());
        causes.extend(self.strategy.validate(ctx, &obj));
        if !causes.is_empty() {
            return Err(self.invalid(&name, causes));
        }

        let key = ObjectKey {
            namespace: obj.namespace(),
            name,
        };
        if state.objects.contains_key(&key) {
            return Err(Error::already_exists(&self.resource, &key.name));
        }
        obj.meta_mut().uid = Some(new_uid());
        if dry_run {
            return Ok(obj);
        }
        tracing::debug!(resource = %self.resource, object = %key, "creating");
        Ok(self.commit(state, ChangeKind::Added, obj, None))
    }

    fn delete_locked(&self, state: &mut State<K>, key: &ObjectKey, dp: &DeleteParams) -> Result<K> {
        let current = state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(&self.resource, &key.name))?;
        if let Some(pre) = &dp.preconditions {
            self.check_preconditions(&current, pre)?;
        }
        if dp.dry_run {
            return Ok(current);
        }
        tracing::debug!(resource = %self.resource, object = %key, "deleting");
        Ok(self.commit(state, ChangeKind::Deleted, current.clone(), Some(current)))
    }

    fn check_preconditions(&self, obj: &K, pre: &Preconditions) -> Result<()> {
        let name = obj.name_any();
        if let Some(uid) = &pre.uid {
            let actual = obj.uid().unwrap_or_default();
            if *uid != actual {
                return Err(Error::conflict(
                    &self.resource,
                    &name,
                    format!("Precondition failed: UID in precondition: {uid}, UID in object meta: {actual}"),
                ));
            }
        }
        if let Some(rv) = &pre.resource_version {
            let actual = obj.resource_version().unwrap_or_default();
            if *rv != actual {
                return Err(Error::conflict(
                    &self.resource,
                    &name,
                    format!(
                        "Precondition failed: ResourceVersion in precondition: {rv}, ResourceVersion in object meta: {actual}"
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Keys of objects visible to `ctx` that match `pred`, starting after `after`
    fn select<'a>(
        &'a self,
        state: &'a State<K>,
        ctx: &'a Context,
        pred: &'a SelectionPredicate,
        after: Option<&ObjectKey>,
    ) -> impl Iterator<Item = (&'a ObjectKey, &'a K)> + 'a {
        let lower = match after {
            Some(key) => Bound::Excluded(key.clone()),
            None => Bound::Unbounded,
        };
        state
            .objects
            .range((lower, Bound::Unbounded))
            .filter(move |(key, _)| self.in_scope(ctx, key))
            .filter(move |(_, obj)| pred.matches(&self.strategy.attrs(obj)))
    }
}

fn parse_version(version: &str) -> Result<Option<u64>> {
    match version {
        "" | "0" => Ok(None),
        v => v
            .parse()
            .map(Some)
            .map_err(|_| Error::BadRequest(format!("invalid resource version: {v:?}"))),
    }
}

fn generate_name(prefix: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..NAME_SUFFIX_LEN)
        .map(|_| NAME_SUFFIX_ALPHABET[rng.random_range(0..NAME_SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

fn new_uid() -> String {
    let hex = format!("{:032x}", rand::random::<u128>());
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// DNS-1123 subdomain rules for object names
fn validate_name(name: &str) -> Vec<StatusCause> {
    const FIELD: &str = "metadata.name";
    if name.is_empty() {
        return vec![StatusCause::required(FIELD)];
    }
    if name.len() > MAX_NAME_LEN {
        return vec![StatusCause::invalid(
            FIELD,
            format!("must be no more than {MAX_NAME_LEN} characters"),
        )];
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let alnum_edges = [name.chars().next(), name.chars().last()]
        .into_iter()
        .flatten()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if valid_chars && alnum_edges {
        vec![]
    } else {
        vec![StatusCause::invalid(
            FIELD,
            format!(
                "{name:?}: a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character"
            ),
        )]
    }
}

/// Projects committed changes onto what one watch may see
struct EventFilter<K> {
    strategy: Strategy<K>,
    predicate: SelectionPredicate,
    namespace: Option<String>,
}

impl<K: Resource + Clone + 'static> EventFilter<K> {
    fn visible(&self, obj: &K) -> bool {
        let in_namespace = match &self.namespace {
            Some(ns) if K::NAMESPACED => obj.namespace().as_deref() == Some(ns.as_str()),
            _ => true,
        };
        in_namespace && self.predicate.matches(&self.strategy.attrs(obj))
    }

    /// Objects moving into the selection are reported as added, objects moving out as deleted
    fn project(&self, change: &Change<K>) -> Option<WatchEvent<K>> {
        let now = self.visible(&change.object);
        let before = change.previous.as_ref().is_some_and(|p| self.visible(p));
        let obj = change.object.clone();
        match change.kind {
            ChangeKind::Added if now => Some(WatchEvent::Added(obj)),
            ChangeKind::Deleted if before || now => Some(WatchEvent::Deleted(obj)),
            ChangeKind::Modified => match (before, now) {
                (true, true) => Some(WatchEvent::Modified(obj)),
                (false, true) => Some(WatchEvent::Added(obj)),
                (true, false) => Some(WatchEvent::Deleted(obj)),
                (false, false) => None,
            },
            _ => None,
        }
    }
}

#[async_trait]
impl<K> Storage<K> for MemoryStore<K>
where
    K: Resource + Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn resource(&self) -> &GroupResource {
        &self.resource
    }

    fn new_object(&self) -> K {
        K::default()
    }

    async fn create(&self, ctx: &Context, obj: K, pp: &PostParams) -> Result<K> {
        let mut state = self.state.write();
        self.insert_new(&mut state, ctx, obj, pp.dry_run)
    }

    async fn get(&self, ctx: &Context, name: &str, gp: &GetParams) -> Result<K> {
        parse_version(gp.resource_version.as_deref().unwrap_or_default())?;
        self.state
            .read()
            .objects
            .get(&self.key(ctx, name))
            .cloned()
            .ok_or_else(|| Error::not_found(&self.resource, name))
    }

    async fn list(&self, ctx: &Context, lp: &ListParams) -> Result<ObjectList<K>> {
        lp.validate()?;
        let pred = SelectionPredicate::from_params(lp)?;
        parse_version(lp.resource_version.as_deref().unwrap_or_default())?;
        let start = lp.continue_token.as_deref().map(ContinueToken::decode).transpose()?;
        if lp.timeout.is_some() {
            tracing::trace!("list served from memory, timeout not needed");
        }

        let state = self.state.read();
        let mut matched = self.select(&state, ctx, &pred, start.as_ref().map(|t| &t.start));
        let items: Vec<K> = match lp.limit {
            Some(limit) => matched
                .by_ref()
                .take(limit.min(self.max_page_size) as usize)
                .map(|(_, obj)| obj.clone())
                .collect(),
            None => matched.by_ref().map(|(_, obj)| obj.clone()).collect(),
        };
        let remaining = matched.count();

        let mut metadata = ListMeta {
            resource_version: Some(state.revision.to_string()),
            ..ListMeta::default()
        };
        if remaining > 0 {
            if let Some(last) = items.last() {
                let token = ContinueToken {
                    rv: state.revision,
                    start: ObjectKey {
                        namespace: last.namespace(),
                        name: last.name_any(),
                    },
                };
                metadata.continue_ = Some(token.encode()?);
                metadata.remaining_item_count = Some(remaining as i64);
            }
        }
        Ok(ObjectList {
            types: Some(TypeMeta::list::<K>()),
            metadata,
            items,
        })
    }

    async fn watch(&self, ctx: &Context, wp: &WatchParams, version: &str) -> Result<WatchStream<K>> {
        let predicate = SelectionPredicate::from_params(wp)?;
        let since = parse_version(version)?;
        let filter = EventFilter {
            strategy: self.strategy.clone(),
            predicate,
            namespace: ctx.namespace().map(String::from),
        };

        // Subscribing under the read lock splits changes cleanly between backlog and channel
        let (backlog, mut rx, mut last) = {
            let state = self.state.read();
            let rx = self.events.subscribe();
            let mut backlog = vec![];
            match since {
                None if wp.send_initial_events => {
                    backlog.extend(
                        state
                            .objects
                            .values()
                            .filter(|obj| filter.visible(obj))
                            .map(|obj| WatchEvent::Added(obj.clone())),
                    );
                    backlog.push(WatchEvent::Bookmark(Bookmark {
                        types: TypeMeta::resource::<K>(),
                        metadata: BookmarkMeta {
                            resource_version: state.revision.to_string(),
                        },
                    }));
                }
                None => {}
                Some(since) if since < state.compacted => {
                    return Err(Error::Expired {
                        requested: since.to_string(),
                        oldest: (state.compacted + 1).to_string(),
                    });
                }
                Some(since) => backlog.extend(
                    state
                        .history
                        .iter()
                        .filter(|change| change.revision > since)
                        .filter_map(|change| filter.project(change)),
                ),
            }
            (backlog, rx, state.revision)
        };

        let stop = ctx.cancellation().child_token();
        let timeout = wp.timeout.map(|secs| Duration::from_secs(secs.into()));
        let resource = self.resource.clone();
        tracing::debug!(%resource, version, backlog = backlog.len(), "starting watch");

        let token = stop.clone();
        let events = async_stream::stream! {
            for event in backlog {
                yield event;
            }
            let deadline = async move {
                match timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending().await,
                }
            };
            tokio::pin!(deadline);
            loop {
                let received = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = &mut deadline => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(change) => {
                        last = change.revision;
                        if let Some(event) = filter.project(&change) {
                            yield event;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%resource, skipped, "watch fell behind, terminating");
                        let err = Error::Expired {
                            requested: last.to_string(),
                            oldest: (last + skipped + 1).to_string(),
                        };
                        yield WatchEvent::Error((&err).into());
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!(%resource, "watch ended");
        };
        Ok(WatchStream::new(events.boxed(), stop))
    }

    async fn update(
        &self,
        ctx: &Context,
        name: &str,
        obj: UpdatedObject<K>,
        force_allow_create: bool,
        pp: &PostParams,
    ) -> Result<(K, bool)> {
        let mut state = self.state.write();
        let key = self.key(ctx, name);
        let current = state.objects.get(&key).cloned();
        let mut obj = obj.resolve(name, current.as_ref())?;

        let Some(old) = current else {
            if !(force_allow_create || self.update_strategy.creates_on_update()) {
                return Err(Error::not_found(&self.resource, name));
            }
            if obj.resource_version().is_some_and(|rv| !rv.is_empty()) {
                return Err(Error::conflict(&self.resource, name, MODIFIED_CONFLICT));
            }
            let created = self.insert_new(&mut state, ctx, obj, pp.dry_run)?;
            return Ok((created, true));
        };

        match obj.resource_version().filter(|rv| !rv.is_empty()) {
            Some(rv) if Some(&rv) != old.meta().resource_version.as_ref() => {
                tracing::debug!(resource = %self.resource, object = %key, "stale resource version");
                return Err(Error::conflict(&self.resource, name, MODIFIED_CONFLICT));
            }
            None if !self.update_strategy.unconditional_update() => {
                return Err(self.invalid(name, vec![StatusCause::invalid(
                    "metadata.resourceVersion",
                    "must be specified for an update",
                )]));
            }
            _ => {}
        }

        {
            let meta = obj.meta_mut();
            let prev = old.meta();
            meta.namespace.clone_from(&prev.namespace);
            meta.uid.clone_from(&prev.uid);
            meta.generation = prev.generation;
            meta.resource_version.clone_from(&prev.resource_version);
        }
        self.update_strategy.prepare_for_update(ctx, &mut obj, &old);
        let causes = self.update_strategy.validate_update(ctx, &obj, &old);
        if !causes.is_empty() {
            return Err(self.invalid(name, causes));
        }

        let unchanged = serde_json::to_value(&obj).map_err(Error::internal)?
            == serde_json::to_value(&old).map_err(Error::internal)?;
        if unchanged || pp.dry_run {
            return Ok((obj, false));
        }
        tracing::debug!(resource = %self.resource, object = %key, "updating");
        Ok((self.commit(&mut state, ChangeKind::Modified, obj, Some(old)), false))
    }

    async fn delete(&self, ctx: &Context, name: &str, dp: &DeleteParams) -> Result<(K, bool)> {
        let mut state = self.state.write();
        let deleted = self.delete_locked(&mut state, &self.key(ctx, name), dp)?;
        Ok((deleted, true))
    }

    async fn delete_collection(
        &self,
        ctx: &Context,
        dp: &DeleteParams,
        lp: &ListParams,
    ) -> Result<ObjectList<K>> {
        lp.validate()?;
        let pred = SelectionPredicate::from_params(lp)?;
        let mut state = self.state.write();
        // Preconditions hold for the whole selection before anything is deleted
        let mut keys = vec![];
        for (key, obj) in self.select(&state, ctx, &pred, None) {
            if let Some(pre) = &dp.preconditions {
                self.check_preconditions(obj, pre)?;
            }
            keys.push(key.clone());
        }
        let mut items = Vec::with_capacity(keys.len());
        for key in &keys {
            items.push(self.delete_locked(&mut state, key, dp)?);
        }
        tracing::debug!(resource = %self.resource, count = items.len(), "deleted collection");
        Ok(ObjectList {
            types: Some(TypeMeta::list::<K>()),
            metadata: ListMeta {
                resource_version: Some(state.revision.to_string()),
                ..ListMeta::default()
            },
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{metadata::ObjectMeta, params::Patch};
    use futures::{FutureExt, StreamExt};
    use serde_json::json;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Note {
        metadata: ObjectMeta,
        #[serde(default)]
        text: String,
    }

    impl Resource for Note {
        const GROUP: &'static str = "test.io";
        const KIND: &'static str = "Note";
        const NAMESPACED: bool = false;
        const PLURAL: &'static str = "notes";
        const VERSION: &'static str = "v1";

        fn meta(&self) -> &ObjectMeta {
            &self.metadata
        }

        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    fn note(name: &str, text: &str) -> Note {
        Note {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..ObjectMeta::default()
            },
            text: text.into(),
        }
    }

    fn store() -> MemoryStore<Note> {
        StoreBuilder::new().build().unwrap()
    }

    async fn seed(store: &MemoryStore<Note>, names: &[&str]) {
        for name in names {
            store
                .create(&Context::new(), note(name, ""), &PostParams::default())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn create_assigns_identity() {
        let store = store();
        let ctx = Context::new();
        let a = store.create(&ctx, note("a", "x"), &PostParams::default()).await.unwrap();
        assert_eq!(a.resource_version().as_deref(), Some("1"));
        assert!(a.uid().is_some());
        assert_eq!(a.metadata.generation, Some(1));

        let err = store.create(&ctx, note("a", "y"), &PostParams::default()).await.unwrap_err();
        assert_eq!(err.reason(), "AlreadyExists");
        assert_eq!(store.revision(), 1);
    }

    #[tokio::test]
    async fn create_generates_names_and_validates() {
        let store = store();
        let ctx = Context::new();
        let mut obj = note("", "");
        obj.metadata.generate_name = Some("chpa-".into());
        let created = store.create(&ctx, obj, &PostParams::default()).await.unwrap();
        let name = created.name_any();
        assert!(name.starts_with("chpa-"));
        assert_eq!(name.len(), "chpa-".len() + NAME_SUFFIX_LEN);

        let err = store.create(&ctx, note("Bad_Name", ""), &PostParams::default()).await.unwrap_err();
        assert!(err.is_invalid());
        let err = store.create(&ctx, note("", ""), &PostParams::default()).await.unwrap_err();
        assert!(err.is_invalid());
    }

    #[tokio::test]
    async fn dry_run_create_persists_nothing() {
        let store = store();
        let pp = PostParams::default().dry_run();
        store.create(&Context::new(), note("a", ""), &pp).await.unwrap();
        let err = store.get(&Context::new(), "a", &GetParams::default()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.revision(), 0);
    }

    #[tokio::test]
    async fn stale_updates_conflict() {
        let store = store();
        let ctx = Context::new();
        let a = store.create(&ctx, note("a", "x"), &PostParams::default()).await.unwrap();

        let mut first = a.clone();
        first.text = "first".into();
        let (first, created) = store
            .update(&ctx, "a", UpdatedObject::Replace(first), false, &PostParams::default())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.resource_version().as_deref(), Some("2"));

        let mut second = a;
        second.text = "second".into();
        let err = store
            .update(&ctx, "a", UpdatedObject::Replace(second), false, &PostParams::default())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_of_missing_object() {
        let store = store();
        let ctx = Context::new();
        let err = store
            .update(&ctx, "a", UpdatedObject::Replace(note("a", "")), false, &PostParams::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let (obj, created) = store
            .update(&ctx, "a", UpdatedObject::Replace(note("", "")), true, &PostParams::default())
            .await
            .unwrap();
        assert!(created);
        assert_eq!(obj.name_any(), "a");
    }

    #[tokio::test]
    async fn update_rejects_renames_and_skips_noops() {
        let store = store();
        let ctx = Context::new();
        let a = store.create(&ctx, note("a", "x"), &PostParams::default()).await.unwrap();
        let err = store
            .update(&ctx, "a", UpdatedObject::Replace(note("b", "")), false, &PostParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), 400);

        let (same, _) = store
            .update(&ctx, "a", UpdatedObject::Replace(a.clone()), false, &PostParams::default())
            .await
            .unwrap();
        assert_eq!(same.resource_version(), a.resource_version());
        assert_eq!(store.revision(), 1);
    }

    #[tokio::test]
    async fn merge_and_json_patches_apply_to_current() {
        let store = store();
        let ctx = Context::new();
        store.create(&ctx, note("a", "x"), &PostParams::default()).await.unwrap();

        let merge = UpdatedObject::from_patch(&Patch::Merge(json!({"text": "merged"}))).unwrap();
        let (obj, _) = store.update(&ctx, "a", merge, false, &PostParams::default()).await.unwrap();
        assert_eq!(obj.text, "merged");

        let ops: json_patch::Patch =
            serde_json::from_value(json!([{"op": "replace", "path": "/text", "value": "patched"}])).unwrap();
        let (obj, _) = store
            .update(&ctx, "a", UpdatedObject::Json(ops), false, &PostParams::default())
            .await
            .unwrap();
        assert_eq!(obj.text, "patched");

        let missing = UpdatedObject::from_patch(&Patch::Merge(json!({}))).unwrap();
        let err = store.update(&ctx, "b", missing, false, &PostParams::default()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_checks_preconditions() {
        let store = store();
        let ctx = Context::new();
        let a = store.create(&ctx, note("a", ""), &PostParams::default()).await.unwrap();

        let wrong = DeleteParams::default().preconditions(Preconditions {
            uid: Some("nope".into()),
            ..Preconditions::default()
        });
        assert!(store.delete(&ctx, "a", &wrong).await.unwrap_err().is_conflict());

        let right = DeleteParams::default().preconditions(Preconditions {
            uid: a.uid(),
            resource_version: a.resource_version(),
        });
        let (gone, immediate) = store.delete(&ctx, "a", &right).await.unwrap();
        assert!(immediate);
        assert_eq!(gone.resource_version().as_deref(), Some("2"));
        assert!(store.delete(&ctx, "a", &right).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_pages_with_continue_tokens() {
        let store = store();
        seed(&store, &["a", "b", "c"]).await;
        let ctx = Context::new();

        let page = store.list(&ctx, &ListParams::default().limit(2)).await.unwrap();
        let names: Vec<_> = page.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(page.metadata.remaining_item_count, Some(1));
        assert_eq!(page.resource_version(), Some("3"));

        let token = page.continue_token().unwrap();
        let rest = store
            .list(&ctx, &ListParams::default().limit(2).continue_token(token))
            .await
            .unwrap();
        let names: Vec<_> = rest.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, ["c"]);
        assert_eq!(rest.continue_token(), None);

        let err = store
            .list(&ctx, &ListParams::default().continue_token("%%%"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn list_filters_by_fields() {
        let store = store();
        seed(&store, &["a", "b"]).await;
        let lp = ListParams::default().fields("metadata.name=b");
        let list = store.list(&Context::new(), &lp).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.items[0].name_any(), "b");
    }

    #[tokio::test]
    async fn delete_collection_removes_matches() {
        let store = store();
        seed(&store, &["a", "b", "c"]).await;
        let ctx = Context::new();
        let lp = ListParams::default().fields("metadata.name!=b");
        let deleted = store.delete_collection(&ctx, &DeleteParams::default(), &lp).await.unwrap();
        assert_eq!(deleted.len(), 2);
        let left = store.list(&ctx, &ListParams::default()).await.unwrap();
        assert_eq!(left.len(), 1);
    }

    #[tokio::test]
    async fn delete_collection_precondition_failure_deletes_nothing() {
        let store = store();
        seed(&store, &["a", "b", "c"]).await;
        let ctx = Context::new();
        let dp = DeleteParams::default().preconditions(Preconditions {
            resource_version: Some("1".into()),
            ..Preconditions::default()
        });
        let err = store
            .delete_collection(&ctx, &dp, &ListParams::default())
            .await
            .unwrap_err();
        assert!(err.is_conflict(), "{err}");
        let left = store.list(&ctx, &ListParams::default()).await.unwrap();
        assert_eq!(left.len(), 3);
        assert_eq!(left.resource_version(), Some("3"));
    }

    #[tokio::test]
    async fn watch_streams_changes_after_start() {
        let store = store();
        seed(&store, &["old"]).await;
        let ctx = Context::new();
        let mut watch = store.watch(&ctx, &WatchParams::default(), "").await.unwrap();
        assert_eq!(store.watcher_count(), 1);

        seed(&store, &["new"]).await;
        store.delete(&ctx, "new", &DeleteParams::default()).await.unwrap();

        match watch.next().await {
            Some(WatchEvent::Added(obj)) => assert_eq!(obj.name_any(), "new"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(watch.next().await, Some(WatchEvent::Deleted(_))));
        assert!(watch.next().now_or_never().is_none());

        watch.stop();
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn watch_initial_events_end_with_bookmark() {
        let store = store();
        seed(&store, &["a", "b"]).await;
        let wp = WatchParams::default().initial_events();
        let watch = store.watch(&Context::new(), &wp, "").await.unwrap();
        let events: Vec<_> = watch.take(3).collect().await;
        assert!(matches!(events[0], WatchEvent::Added(_)));
        assert!(matches!(events[1], WatchEvent::Added(_)));
        match &events[2] {
            WatchEvent::Bookmark(b) => assert_eq!(b.metadata.resource_version, "2"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn watch_resumes_from_history_or_expires() {
        let store = StoreBuilder::<Note>::new().history_window(2).build().unwrap();
        seed(&store, &["a", "b", "c"]).await;
        let ctx = Context::new();

        let watch = store.watch(&ctx, &WatchParams::default(), "1").await.unwrap();
        let names: Vec<_> = watch
            .take(2)
            .map(|e| e.into_object().unwrap().name_any())
            .collect()
            .await;
        assert_eq!(names, ["b", "c"]);

        let err = store.watch(&ctx, &WatchParams::default(), "0").await;
        assert!(err.is_ok());
        let err = store.watch(&ctx, &WatchParams::default(), "abc").await.unwrap_err();
        assert_eq!(err.code(), 400);
        let store = StoreBuilder::<Note>::new().history_window(1).build().unwrap();
        seed(&store, &["a", "b", "c"]).await;
        let err = store.watch(&ctx, &WatchParams::default(), "1").await.unwrap_err();
        assert_eq!(err.code(), 410);
    }

    #[tokio::test]
    async fn watch_reports_objects_leaving_the_selection() {
        let store = store();
        let ctx = Context::new();
        let mut labelled = note("a", "");
        labelled.metadata.labels = Some([("keep".to_string(), "yes".to_string())].into());
        let a = store.create(&ctx, labelled, &PostParams::default()).await.unwrap();
        let wp = WatchParams::default().labels("keep=yes");
        let mut watch = store.watch(&ctx, &wp, "").await.unwrap();

        seed(&store, &["b"]).await;
        let mut changed = a.clone();
        changed.text = "z".into();
        let (changed, _) = store
            .update(&ctx, "a", UpdatedObject::Replace(changed), false, &PostParams::default())
            .await
            .unwrap();
        let mut unlabelled = changed;
        unlabelled.metadata.labels = None;
        store
            .update(&ctx, "a", UpdatedObject::Replace(unlabelled), false, &PostParams::default())
            .await
            .unwrap();

        assert!(matches!(watch.next().await, Some(WatchEvent::Modified(_))));
        match watch.next().await {
            Some(WatchEvent::Deleted(obj)) => assert!(obj.labels().is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn watch_ends_on_cancel_and_timeout() {
        let store = store();
        let ctx = Context::new();
        let watch = store.watch(&ctx, &WatchParams::default(), "").await.unwrap();
        ctx.cancel();
        assert_eq!(watch.collect::<Vec<_>>().await.len(), 0);

        tokio::time::pause();
        let wp = WatchParams::default().timeout(5);
        let watch = store.watch(&Context::new(), &wp, "").await.unwrap();
        assert_eq!(watch.collect::<Vec<_>>().await.len(), 0);
    }

    #[tokio::test]
    async fn builder_rejects_zero_settings() {
        let err = StoreBuilder::<Note>::new().watch_capacity(0).build().unwrap_err();
        assert_eq!(err.to_string(), "store for notes.test.io: watchCapacity must be positive");
        let err = StoreBuilder::<Note>::new()
            .resource(GroupResource::new("", ""))
            .build()
            .unwrap_err();
        assert!(matches!(err, BootstrapError::MissingResource { kind: "Note" }));
    }

    #[tokio::test]
    async fn status_view_shares_objects() {
        let store = store();
        let status = store.with_update_strategy(Strategy::default().allow_create_on_update(true));
        seed(&store, &["a"]).await;
        let got = status.get(&Context::new(), "a", &GetParams::default()).await.unwrap();
        assert_eq!(got.name_any(), "a");
        let (_, created) = status
            .update(&Context::new(), "z", UpdatedObject::Replace(note("z", "")), false, &PostParams::default())
            .await
            .unwrap();
        assert!(created);
    }
}
