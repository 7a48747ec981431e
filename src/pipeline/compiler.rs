//! Template compilation with per-run memoization and an optional
//! process-wide cache.
//!
//! Within one composition run the same normalized key is compiled exactly
//! once; every subsequent render job referencing that key reuses the same
//! artifact by reference. This matters for the common case of N records
//! sharing one subreport template.
//!
//! The baseline design recompiles on every request. [`SharedTemplateCache`]
//! is the opt-in cross-request extension: entries are keyed by normalized
//! key plus a SHA-256 content fingerprint (resource edits invalidate), and
//! at most one compile per key is in flight at a time (waiters block until
//! the winner publishes its result).

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, PoisonError};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::engine::{CompiledTemplate, RenderEngine};
use crate::error::{Error, Result};
use crate::request::TemplateKey;
use crate::resolver::ResourceResolver;

/// Compiles template resources for one composition run.
///
/// Holds the per-run registry of compiled templates; the registry's
/// insertion order is first-compile order, but job assembly re-walks the
/// request so registry order never leaks into job order.
pub struct TemplateCompiler<'a> {
    engine: &'a dyn RenderEngine,
    resolver: &'a dyn ResourceResolver,
    shared: Option<&'a SharedTemplateCache>,
    compiled: IndexMap<TemplateKey, CompiledTemplate>,
}

impl<'a> TemplateCompiler<'a> {
    /// A compiler for one run against `engine` and `resolver`.
    pub fn new(engine: &'a dyn RenderEngine, resolver: &'a dyn ResourceResolver) -> Self {
        TemplateCompiler {
            engine,
            resolver,
            shared: None,
            compiled: IndexMap::new(),
        }
    }

    /// Consult `cache` before invoking the engine.
    pub fn with_shared_cache(mut self, cache: &'a SharedTemplateCache) -> Self {
        self.shared = Some(cache);
        self
    }

    /// Resolve and compile `key`, memoized per run.
    ///
    /// The resolved resource handle is consumed exactly once and released
    /// whether or not compilation succeeds.
    pub fn compile(&mut self, key: &TemplateKey) -> Result<CompiledTemplate> {
        if let Some(template) = self.compiled.get(key) {
            log::debug!("template '{}' already compiled in this run", key);
            return Ok(template.clone());
        }

        let resource = self.resolver.resolve(key)?;
        let origin = resource.origin().to_string();
        // into_bytes consumes the handle on every path.
        let source = resource.into_bytes()?;

        let template = match self.shared {
            Some(cache) => cache.get_or_compile(self.engine, key, &source),
            None => self.engine.compile(key, &source),
        }
        .map_err(|err| into_compile_error(key, err))?;

        log::debug!(
            "compiled template '{}' from {} ({} bytes)",
            key,
            origin,
            source.len()
        );
        self.compiled.insert(key.clone(), template.clone());
        Ok(template)
    }

    /// The per-run registry of compiled templates.
    pub fn registry(&self) -> &IndexMap<TemplateKey, CompiledTemplate> {
        &self.compiled
    }

    /// Consume the compiler, yielding the registry.
    pub fn into_registry(self) -> IndexMap<TemplateKey, CompiledTemplate> {
        self.compiled
    }
}

fn into_compile_error(key: &TemplateKey, err: Error) -> Error {
    match err {
        err @ (Error::Compile { .. } | Error::TemplateNotFound { .. }) => err,
        other => Error::Compile {
            key: key.to_string(),
            reason: other.to_string(),
        },
    }
}

type Fingerprint = [u8; 32];

fn fingerprint(source: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(source);
    hasher.finalize().into()
}

enum CacheSlot {
    /// Some thread is compiling this key; wait for it.
    InFlight,
    Ready {
        fingerprint: Fingerprint,
        template: CompiledTemplate,
    },
}

/// A process-wide compiled-template cache with single-flight compilation.
///
/// Injectable, never ambient: the pipeline only consults a cache it was
/// explicitly handed. Entries are invalidated when the resource content
/// fingerprint changes.
#[derive(Default)]
pub struct SharedTemplateCache {
    slots: Mutex<HashMap<TemplateKey, CacheSlot>>,
    ready: Condvar,
}

impl SharedTemplateCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached template for `key` if its fingerprint still
    /// matches `source`, otherwise compile through `engine` and publish the
    /// result. Concurrent callers for the same key block until the single
    /// in-flight compile finishes.
    pub fn get_or_compile(
        &self,
        engine: &dyn RenderEngine,
        key: &TemplateKey,
        source: &[u8],
    ) -> Result<CompiledTemplate> {
        let print = fingerprint(source);

        let mut slots = self.lock();
        loop {
            match slots.get(key) {
                Some(CacheSlot::Ready { fingerprint, template }) if *fingerprint == print => {
                    log::debug!("shared cache hit for template '{}'", key);
                    return Ok(template.clone());
                }
                Some(CacheSlot::Ready { .. }) => {
                    log::info!("template '{}' changed on disk, recompiling", key);
                    slots.remove(key);
                }
                Some(CacheSlot::InFlight) => {
                    slots = self
                        .ready
                        .wait(slots)
                        .unwrap_or_else(PoisonError::into_inner);
                    continue;
                }
                None => {}
            }
            slots.insert(key.clone(), CacheSlot::InFlight);
            break;
        }
        drop(slots);

        let outcome = engine.compile(key, source);

        let mut slots = self.lock();
        match outcome {
            Ok(template) => {
                slots.insert(
                    key.clone(),
                    CacheSlot::Ready {
                        fingerprint: print,
                        template: template.clone(),
                    },
                );
                self.ready.notify_all();
                Ok(template)
            }
            Err(err) => {
                // Leave no in-flight marker behind; the next caller retries.
                slots.remove(key);
                self.ready.notify_all();
                Err(err)
            }
        }
    }

    /// Number of cached templates (in-flight compiles excluded).
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot, CacheSlot::Ready { .. }))
            .count()
    }

    /// Whether the cache holds no finished entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.lock().clear();
        self.ready.notify_all();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TemplateKey, CacheSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CompositionParameters, PaginatedOutput, RowSource};
    use crate::resolver::MemoryResolver;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEngine {
        compiles: AtomicUsize,
    }

    impl CountingEngine {
        fn new() -> Self {
            CountingEngine {
                compiles: AtomicUsize::new(0),
            }
        }

        fn compile_count(&self) -> usize {
            self.compiles.load(Ordering::SeqCst)
        }
    }

    impl RenderEngine for CountingEngine {
        fn compile(&self, key: &TemplateKey, source: &[u8]) -> Result<CompiledTemplate> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            if source.starts_with(b"broken") {
                return Err(Error::Compile {
                    key: key.to_string(),
                    reason: "unparseable template".to_string(),
                });
            }
            Ok(CompiledTemplate::new(key.clone(), source.to_vec()))
        }

        fn fill(
            &self,
            _template: &CompiledTemplate,
            _parameters: &CompositionParameters,
            _rows: &RowSource,
        ) -> Result<PaginatedOutput> {
            Ok(PaginatedOutput::new())
        }

        fn export(&self, _output: &PaginatedOutput, _sink: &mut dyn Write) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_memoizes_within_run() {
        let engine = CountingEngine::new();
        let resolver = MemoryResolver::new().with("relative", b"r".to_vec());
        let mut compiler = TemplateCompiler::new(&engine, &resolver);

        let key = TemplateKey::new("relative");
        let first = compiler.compile(&key).unwrap();
        let second = compiler.compile(&key).unwrap();

        assert_eq!(engine.compile_count(), 1);
        assert!(first.shares_artifact(&second));
    }

    #[test]
    fn test_not_found_propagates() {
        let engine = CountingEngine::new();
        let resolver = MemoryResolver::new();
        let mut compiler = TemplateCompiler::new(&engine, &resolver);

        let err = compiler.compile(&TemplateKey::new("ghost")).unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound { .. }));
        assert_eq!(engine.compile_count(), 0);
    }

    #[test]
    fn test_compile_failure_names_key() {
        let engine = CountingEngine::new();
        let resolver = MemoryResolver::new().with("bad", b"broken".to_vec());
        let mut compiler = TemplateCompiler::new(&engine, &resolver);

        let err = compiler.compile(&TemplateKey::new("bad")).unwrap_err();
        match err {
            Error::Compile { key, .. } => assert_eq!(key, "bad"),
            other => panic!("expected Compile, got {other:?}"),
        }
    }

    #[test]
    fn test_shared_cache_hits_across_runs() {
        let engine = CountingEngine::new();
        let resolver = MemoryResolver::new().with("master", b"m".to_vec());
        let cache = SharedTemplateCache::new();

        for _ in 0..3 {
            let mut compiler = TemplateCompiler::new(&engine, &resolver).with_shared_cache(&cache);
            compiler.compile(&TemplateKey::master()).unwrap();
        }

        assert_eq!(engine.compile_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shared_cache_invalidates_on_content_change() {
        let engine = CountingEngine::new();
        let cache = SharedTemplateCache::new();
        let key = TemplateKey::new("master");

        cache.get_or_compile(&engine, &key, b"v1").unwrap();
        cache.get_or_compile(&engine, &key, b"v1").unwrap();
        cache.get_or_compile(&engine, &key, b"v2").unwrap();

        assert_eq!(engine.compile_count(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shared_cache_failure_leaves_no_marker() {
        let engine = CountingEngine::new();
        let cache = SharedTemplateCache::new();
        let key = TemplateKey::new("bad");

        assert!(cache.get_or_compile(&engine, &key, b"broken").is_err());
        assert!(cache.is_empty());
        // A retry is attempted rather than waiting on a stale marker.
        assert!(cache.get_or_compile(&engine, &key, b"broken").is_err());
        assert_eq!(engine.compile_count(), 2);
    }

    #[test]
    fn test_shared_cache_single_flight_under_concurrency() {
        let engine = CountingEngine::new();
        let cache = SharedTemplateCache::new();
        let key = TemplateKey::new("master");

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    cache.get_or_compile(&engine, &key, b"m").unwrap();
                });
            }
        });

        // Winners publish, waiters reuse; at most one compile can win, and
        // late starters hit the ready entry.
        assert_eq!(engine.compile_count(), 1);
    }
}
