//! Async helper placeholders.
//!
//! Template engines render synchronously, so an async helper cannot produce
//! its value while the template is being evaluated. Instead, the wrapped
//! helper records the call in a stash and returns a placeholder token. The
//! caller later looks for tokens in the rendered output and resolves each one.
//!
//! Tokens have the shape `__async_<nonce>_<seq>__`, where the nonce is 32
//! random hex digits fixed per store and `seq` increases per call. They only
//! contain ASCII alphanumerics and underscores so escaping engines pass them
//! through untouched.
//!
//! Renders wrap their helpers through a [`RenderScope`]. Dropping the scope
//! forgets every call it stashed, so a failed or abandoned render leaves
//! nothing behind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::trace;
use serde_json::Value;

use crate::{value_to_string, AsyncHelper, Helper, HelperError};

const TOKEN_SUFFIX: &str = "__";

struct Pending {
    name: String,
    helper: AsyncHelper,
    args: Vec<Value>,
    scoped: bool,
}

#[derive(Default)]
struct State {
    helpers: BTreeMap<String, AsyncHelper>,
    stash: BTreeMap<u64, Pending>,
    // Values of scoped calls, kept until their scope drops so a token that
    // shows up twice (as an argument and in the output) resolves both times.
    resolved: BTreeMap<u64, Value>,
}

struct Inner {
    prefix: String,
    next: AtomicU64,
    state: Mutex<State>,
}

/// Registry of async helpers plus the stash of their pending invocations.
///
/// The store is a cheap handle: clones share the same helpers and stash.
#[derive(Clone)]
pub struct AsyncHelperStore {
    inner: Arc<Inner>,
}

impl Default for AsyncHelperStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AsyncHelperStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("AsyncHelperStore")
            .field("prefix", &self.inner.prefix)
            .field("helpers", &state.helpers.keys().collect::<Vec<_>>())
            .field("pending", &state.stash.len())
            .finish()
    }
}

impl AsyncHelperStore {
    pub fn new() -> Self {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        Self {
            inner: Arc::new(Inner {
                prefix: format!("__async_{}_", nonce),
                next: AtomicU64::new(0),
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic: every mutation is a single
        // map insert or remove.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an async helper under `name`.
    pub fn set(&self, name: impl Into<String>, helper: AsyncHelper) {
        self.lock().helpers.insert(name.into(), helper);
    }

    pub fn get(&self, name: &str) -> Option<AsyncHelper> {
        self.lock().helpers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().helpers.keys().cloned().collect()
    }

    /// Returns a synchronous stand-in for the registered helper `name`.
    pub fn wrap(&self, name: &str) -> Option<Helper> {
        let helper = self.get(name)?;
        Some(self.wrap_helper(name, helper))
    }

    /// Returns a synchronous stand-in for `helper`.
    ///
    /// Calling the returned helper never runs `helper`; it stashes the call
    /// and returns the placeholder token as a string value.
    pub fn wrap_helper(&self, name: &str, helper: AsyncHelper) -> Helper {
        let store = self.clone();
        let name = name.to_string();
        Helper::new(move |args| {
            let seq = store.defer(&name, helper.clone(), args.to_vec(), false);
            Ok(Value::String(store.token(seq)))
        })
    }

    /// Opens a scope for one render.
    pub fn scope(&self) -> RenderScope {
        RenderScope {
            store: self.clone(),
            seqs: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    /// Returns wrapped stand-ins for every registered helper.
    pub fn wrapped(&self) -> BTreeMap<String, Helper> {
        let helpers: Vec<(String, AsyncHelper)> = self
            .lock()
            .helpers
            .iter()
            .map(|(name, helper)| (name.clone(), helper.clone()))
            .collect();
        helpers
            .into_iter()
            .map(|(name, helper)| {
                let wrapped = self.wrap_helper(&name, helper);
                (name, wrapped)
            })
            .collect()
    }

    fn defer(&self, name: &str, helper: AsyncHelper, args: Vec<Value>, scoped: bool) -> u64 {
        let seq = self.inner.next.fetch_add(1, Ordering::Relaxed);
        trace!("stashing async helper \"{}\" as {}", name, self.token(seq));
        self.lock().stash.insert(
            seq,
            Pending {
                name: name.to_string(),
                helper,
                args,
                scoped,
            },
        );
        seq
    }

    fn token(&self, seq: u64) -> String {
        format!("{}{}{}", self.inner.prefix, seq, TOKEN_SUFFIX)
    }

    fn sequence(&self, token: &str) -> Option<u64> {
        token
            .strip_prefix(self.inner.prefix.as_str())?
            .strip_suffix(TOKEN_SUFFIX)?
            .parse()
            .ok()
    }

    /// Returns true if `candidate` has this store's token shape.
    pub fn is_token(&self, candidate: &str) -> bool {
        self.sequence(candidate).is_some()
    }

    /// Every token of this store occurring in `text`, in order of appearance.
    fn tokens_in(&self, text: &str) -> Vec<String> {
        let prefix = self.inner.prefix.as_str();
        text.match_indices(prefix)
            .filter_map(|(start, _)| {
                let rest = &text[start + prefix.len()..];
                let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
                if digits == 0 || !rest[digits..].starts_with(TOKEN_SUFFIX) {
                    return None;
                }
                Some(self.token(rest[..digits].parse().ok()?))
            })
            .collect()
    }

    fn is_known(&self, token: &str) -> bool {
        match self.sequence(token) {
            Some(seq) => {
                let state = self.lock();
                state.stash.contains_key(&seq) || state.resolved.contains_key(&seq)
            }
            None => false,
        }
    }

    /// Returns true if `token` refers to a call that has not been resolved.
    pub fn has_pending(&self, token: &str) -> bool {
        match self.sequence(token) {
            Some(seq) => self.lock().stash.contains_key(&seq),
            None => false,
        }
    }

    /// Returns the pending tokens in the order they were created.
    pub fn stash(&self) -> Vec<String> {
        let seqs: Vec<u64> = self.lock().stash.keys().copied().collect();
        seqs.into_iter().map(|seq| self.token(seq)).collect()
    }

    pub fn stash_len(&self) -> usize {
        self.lock().stash.len()
    }

    /// Drops every pending call without running it.
    pub fn clear_stash(&self) {
        let mut state = self.lock();
        state.stash.clear();
        state.resolved.clear();
    }

    /// Runs the pending call behind `token` and returns its value.
    ///
    /// Tokens inside string arguments (an async helper fed the output of
    /// another one, possibly through sync helpers) are resolved first. An
    /// argument that is exactly one token takes the nested value as is.
    ///
    /// The entry leaves the stash whether or not the helper succeeds. Values
    /// of calls made through a [`RenderScope`] stay available to later
    /// `resolve` calls until the scope drops.
    pub fn resolve(&self, token: &str) -> BoxFuture<'static, Result<Value, HelperError>> {
        let store = self.clone();
        let token = token.to_string();
        async move {
            let seq = store
                .sequence(&token)
                .ok_or_else(|| HelperError::UnknownToken(token.clone()))?;
            let pending = {
                let mut state = store.lock();
                if let Some(value) = state.resolved.get(&seq) {
                    return Ok(value.clone());
                }
                state.stash.remove(&seq)
            }
            .ok_or_else(|| HelperError::UnknownToken(token.clone()))?;

            let mut args = Vec::with_capacity(pending.args.len());
            for arg in pending.args {
                args.push(store.resolve_arg(arg).await?);
            }

            trace!("resolving async helper \"{}\" for {}", pending.name, token);
            let value = pending.helper.call(args).await?;
            if pending.scoped {
                store.lock().resolved.insert(seq, value.clone());
            }
            Ok(value)
        }
        .boxed()
    }

    async fn resolve_arg(&self, arg: Value) -> Result<Value, HelperError> {
        let mut text = match arg {
            Value::String(text) if self.is_known(&text) => return self.resolve(&text).await,
            Value::String(text) => text,
            other => return Ok(other),
        };
        for nested in self.tokens_in(&text) {
            if text.contains(&nested) && self.is_known(&nested) {
                let value = self.resolve(&nested).await?;
                text = text.replace(&nested, &value_to_string(&value));
            }
        }
        Ok(Value::String(text))
    }
}

/// The async helper calls made by a single render.
///
/// Helpers wrapped through a scope stash their calls like
/// [`AsyncHelperStore::wrap_helper`] does, and the scope remembers each one.
/// Dropping the scope removes all of them from the store, resolved or not.
/// A wrapped helper called after its scope dropped fails.
pub struct RenderScope {
    store: AsyncHelperStore,
    seqs: Arc<Mutex<Option<Vec<u64>>>>,
}

impl RenderScope {
    pub fn store(&self) -> &AsyncHelperStore {
        &self.store
    }

    /// Returns a synchronous stand-in for `helper` whose calls belong to
    /// this scope.
    pub fn wrap_helper(&self, name: &str, helper: AsyncHelper) -> Helper {
        let store = self.store.clone();
        let seqs = Arc::clone(&self.seqs);
        let name = name.to_string();
        Helper::new(move |args| {
            let mut seqs = seqs.lock().unwrap_or_else(PoisonError::into_inner);
            let seqs = seqs.as_mut().ok_or_else(|| {
                HelperError::failed(format!(
                    "async helper \"{}\" called after its render finished",
                    name
                ))
            })?;
            let seq = store.defer(&name, helper.clone(), args.to_vec(), true);
            seqs.push(seq);
            Ok(Value::String(store.token(seq)))
        })
    }

    fn seqs(&self) -> Vec<u64> {
        let mut seqs = self
            .seqs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default();
        seqs.sort_unstable();
        seqs
    }

    /// Tokens of this scope the store still knows, pending or resolved, in
    /// creation order.
    pub fn tokens(&self) -> Vec<String> {
        let seqs = self.seqs();
        let state = self.store.lock();
        seqs.into_iter()
            .filter(|seq| state.stash.contains_key(seq) || state.resolved.contains_key(seq))
            .map(|seq| self.store.token(seq))
            .collect()
    }

    /// Number of calls of this scope not resolved yet.
    pub fn pending_len(&self) -> usize {
        let seqs = self.seqs();
        let state = self.store.lock();
        seqs.iter().filter(|seq| state.stash.contains_key(seq)).count()
    }
}

impl fmt::Debug for RenderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderScope")
            .field("store", &self.store.inner.prefix)
            .field("calls", &self.seqs().len())
            .finish()
    }
}

impl Drop for RenderScope {
    fn drop(&mut self) {
        let seqs = self
            .seqs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();
        if seqs.is_empty() {
            return;
        }
        let mut state = self.store.lock();
        for seq in &seqs {
            state.stash.remove(seq);
            state.resolved.remove(seq);
        }
        trace!("dropped {} async helper calls of a finished render", seqs.len());
    }
}
