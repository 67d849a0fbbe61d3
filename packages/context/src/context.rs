//! The component registry.
//!
//! Wiring happens in two phases. [`Context::new`] walks the configuration
//! tree and records every mapping that carries a `kind` key under its dotted
//! path, constructing nothing. [`Context::resolve`] then builds components on
//! demand, once each, in whatever order references require.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use cairn_config::{ConfigError, Node, Value, ValueExtractor};
use cairn_store::{Error, FormatterRegistry, Key, Result, Storage};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{ComponentConfig, KindRegistry};

/// Options whose values name other components.
const REFERENCE_OPTIONS: &[&str] = &["storage", "source", "storages"];

/// Lifecycle of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Declared, not constructed.
    Uninitialized,
    /// Construction or `init` in flight.
    Initializing,
    /// Constructed and initialized.
    Ready,
    /// Stopped at shutdown. Never restarted.
    Stopped,
}

type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// One declared component.
struct Entry {
    name: String,
    kind: String,
    node: Node,
    /// Raw reference names from `storage`, `source` and `storages`.
    references: Vec<String>,
    instance: OnceCell<Arc<dyn Storage>>,
    state: Mutex<State>,
}

impl Entry {
    fn state(&self) -> State {
        *self.state.lock()
    }

    fn set_state(&self, state: State) {
        *self.state.lock() = state;
    }

    /// Move from `from` to `to`; false if the entry was elsewhere.
    fn transition(&self, from: State, to: State) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }
}

struct Inner {
    config: Node,
    entries: HashMap<String, Arc<Entry>>,
    /// Entry names in declaration order.
    declared: Vec<String>,
    kinds: KindRegistry,
    formatters: Arc<FormatterRegistry>,
    /// Names in the order their construction completed.
    constructed: Mutex<Vec<String>>,
    /// Nested views handed out by `resolve`, keyed by full dotted name.
    nested: Mutex<HashMap<String, Arc<dyn Storage>>>,
    hooks: Mutex<Vec<ShutdownHook>>,
    closed: AtomicBool,
}

/// The registry. Cheap to clone; clones share state.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use cairn_config::Node;
/// use cairn_context::{Context, KindRegistry};
/// use cairn_store::{Key, MemoryStorage, Storage, Value};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut kinds = KindRegistry::new();
/// kinds
///     .register("memory", |c| Ok(Arc::new(MemoryStorage::new(c.name()))))
///     .unwrap();
///
/// let config = Node::from_value(serde_json::json!({
///     "storage": {"users": {"kind": "memory"}},
/// }))
/// .unwrap();
/// let context = Context::new(config, kinds).unwrap();
///
/// let users = context.resolve("storage.users").await.unwrap();
/// users.set(&Key::from("42"), Some(Value::from("alice"))).await.unwrap();
/// context.shutdown().await.unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Register every component declared in `config` with the stock
    /// formatters.
    pub fn new(config: Node, kinds: KindRegistry) -> Result<Self> {
        Self::with_formatters(config, kinds, FormatterRegistry::with_defaults())
    }

    pub fn with_formatters(
        config: Node,
        kinds: KindRegistry,
        formatters: FormatterRegistry,
    ) -> Result<Self> {
        let mut declared = Vec::new();
        collect_components(config.as_map(), "", &mut declared);

        let mut entries = HashMap::new();
        let mut names = Vec::with_capacity(declared.len());
        for (name, map) in declared {
            let node = Node::from(map);
            let kind = ValueExtractor::new(&node)
                .get_str("kind")?
                .unwrap_or_default();
            let references = reference_names(&name, &node)?;
            debug!(component = %name, kind = %kind, "declared");
            names.push(name.clone());
            entries.insert(
                name.clone(),
                Arc::new(Entry {
                    name,
                    kind,
                    node,
                    references,
                    instance: OnceCell::new(),
                    state: Mutex::new(State::Uninitialized),
                }),
            );
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                entries,
                declared: names,
                kinds,
                formatters: Arc::new(formatters),
                constructed: Mutex::new(Vec::new()),
                nested: Mutex::new(HashMap::new()),
                hooks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The configuration the registry was built from.
    pub fn config(&self) -> &Node {
        &self.inner.config
    }

    /// Declared component names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.declared.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    pub fn state(&self, name: &str) -> Option<State> {
        self.inner.entries.get(name).map(|entry| entry.state())
    }

    /// Names of constructed components, oldest first.
    pub fn construction_order(&self) -> Vec<String> {
        self.inner.constructed.lock().clone()
    }

    /// A non-owning handle for components to resolve their references with.
    pub fn downgrade(&self) -> ContextRef {
        ContextRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Resolve a dotted name to a live storage, constructing it on first use.
    ///
    /// Concurrent callers for one name share a single construction. A name
    /// that extends a declared component (`storage.sub`) resolves to that
    /// component's nested view under `sub`.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Storage>> {
        let (entry, rest) = self.inner.owner_of(name).ok_or_else(|| {
            Error::from(ConfigError::UnknownComponent {
                name: name.to_string(),
            })
        })?;
        let storage = self.construct(&entry).await?;
        let Some(rest) = rest else {
            return Ok(storage);
        };

        let cached = self.inner.nested.lock().get(name).cloned();
        if let Some(view) = cached {
            return Ok(view);
        }
        let key = Key::Seq(rest.split('.').map(Key::from).collect());
        let view = storage.nested(&key)?;
        debug!(component = %entry.name, view = %name, "nested view");
        Ok(self
            .inner
            .nested
            .lock()
            .entry(name.to_string())
            .or_insert(view)
            .clone())
    }

    /// Resolve every declared component, in declaration order.
    pub async fn init_all(&self) -> Result<()> {
        for name in &self.inner.declared {
            self.resolve(name).await?;
        }
        Ok(())
    }

    /// Register a callback run once at shutdown, before any component is
    /// stopped. Hooks run in registration order.
    pub fn on_shutdown<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .hooks
            .lock()
            .push(Box::new(move || hook().boxed()));
    }

    /// Run the shutdown hooks, then stop components in reverse construction
    /// order.
    ///
    /// Every ready component gets its `stop` call even if an earlier one
    /// fails; the first failure is returned. Calling this again is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);

        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        if !hooks.is_empty() {
            info!(count = hooks.len(), "running shutdown hooks");
        }
        for hook in hooks {
            hook().await;
        }

        let order = self.construction_order();
        let mut first_error = None;
        for name in order.iter().rev() {
            let Some(entry) = self.inner.entries.get(name) else {
                continue;
            };
            if !entry.transition(State::Ready, State::Stopped) {
                continue;
            }
            let Some(storage) = entry.instance.get() else {
                continue;
            };
            info!(component = %name, "stopping");
            if let Err(e) = storage.stop().await {
                warn!(component = %name, error = %e, "stop failed");
                first_error.get_or_insert(e);
            }
        }
        self.inner.nested.lock().clear();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn construct(&self, entry: &Arc<Entry>) -> Result<Arc<dyn Storage>> {
        if let Some(storage) = entry.instance.get() {
            if entry.state() == State::Stopped {
                return Err(Error::usage(format!("component {} is stopped", entry.name)));
            }
            return Ok(storage.clone());
        }
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::usage(format!(
                "registry is shut down; cannot construct {}",
                entry.name
            )));
        }
        self.inner.check_cycles(&entry.name)?;
        let storage = entry.instance.get_or_try_init(|| self.build(entry)).await?;
        Ok(storage.clone())
    }

    async fn build(&self, entry: &Entry) -> Result<Arc<dyn Storage>> {
        let factory = self.inner.kinds.get(&entry.kind).cloned().ok_or_else(|| {
            Error::from(ConfigError::UnknownKind {
                component: entry.name.clone(),
                kind: entry.kind.clone(),
            })
        })?;

        entry.set_state(State::Initializing);
        debug!(component = %entry.name, kind = %entry.kind, "constructing");
        let config = ComponentConfig::new(
            entry.name.clone(),
            entry.node.clone(),
            self.downgrade(),
            self.inner.formatters.clone(),
        );
        let built = match factory(config) {
            Ok(storage) => storage.init().await.map(|()| storage),
            Err(e) => Err(e),
        };

        match built {
            Ok(storage) => {
                entry.set_state(State::Ready);
                self.inner.constructed.lock().push(entry.name.clone());
                info!(component = %entry.name, kind = %entry.kind, "component ready");
                Ok(storage)
            }
            Err(e) => {
                entry.set_state(State::Uninitialized);
                warn!(component = %entry.name, error = %e, "construction failed");
                Err(e)
            }
        }
    }
}

impl Inner {
    /// The entry named by `name`, or by its longest dotted prefix together
    /// with the remainder.
    fn owner_of<'a>(&self, name: &'a str) -> Option<(Arc<Entry>, Option<&'a str>)> {
        if let Some(entry) = self.entries.get(name) {
            return Some((entry.clone(), None));
        }
        let mut prefix = name;
        while let Some((head, _)) = prefix.rsplit_once('.') {
            if let Some(entry) = self.entries.get(head) {
                return Some((entry.clone(), Some(&name[head.len() + 1..])));
            }
            prefix = head;
        }
        None
    }

    /// Depth-first walk of the reference graph from `start`.
    fn check_cycles(&self, start: &str) -> Result<()> {
        let mut path = Vec::new();
        let mut done = HashSet::new();
        self.visit(start, &mut path, &mut done)
            .map_err(Error::from)
    }

    fn visit(
        &self,
        name: &str,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> std::result::Result<(), ConfigError> {
        if let Some(pos) = path.iter().position(|n| n == name) {
            let mut chain = path[pos..].to_vec();
            chain.push(name.to_string());
            return Err(ConfigError::CyclicReference { chain });
        }
        if done.contains(name) {
            return Ok(());
        }
        let Some(entry) = self.entries.get(name) else {
            return Ok(());
        };
        path.push(name.to_string());
        for reference in &entry.references {
            // Unknown targets fail later, at resolution.
            if let Some((target, _)) = self.owner_of(reference) {
                self.visit(&target.name, path, done)?;
            }
        }
        path.pop();
        done.insert(name.to_string());
        Ok(())
    }
}

/// A weak handle on a [`Context`], held by components.
#[derive(Clone)]
pub struct ContextRef {
    inner: Weak<Inner>,
}

impl ContextRef {
    /// A handle that never upgrades.
    pub fn detached() -> Self {
        Self { inner: Weak::new() }
    }

    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }

    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Storage>> {
        let context = self
            .upgrade()
            .ok_or_else(|| Error::usage(format!("no registry to resolve {}", name)))?;
        context.resolve(name).await
    }
}

/// Collect `(dotted name, mapping)` for every mapping with a `kind` key.
/// Component subtrees are not searched further.
fn collect_components(
    map: &serde_json::Map<String, Value>,
    prefix: &str,
    out: &mut Vec<(String, serde_json::Map<String, Value>)>,
) {
    for (key, value) in map {
        let Value::Object(child) = value else {
            continue;
        };
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        if child.contains_key("kind") {
            out.push((name, child.clone()));
        } else {
            collect_components(child, &name, out);
        }
    }
}

fn reference_names(component: &str, node: &Node) -> Result<Vec<String>> {
    let extractor = ValueExtractor::new(node);
    let mut names = Vec::new();
    for option in REFERENCE_OPTIONS {
        if let Some(list) = extractor.get_str_list(option)? {
            names.extend(list);
        }
    }
    if names.iter().any(|n| n == component) {
        return Err(ConfigError::CyclicReference {
            chain: vec![component.to_string(), component.to_string()],
        }
        .into());
    }
    Ok(names)
}
