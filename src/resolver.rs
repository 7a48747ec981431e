//! Template resource resolution.
//!
//! A resolver maps a normalized [`TemplateKey`] to a readable resource. The
//! resolution scheme is deliberately simple: a fixed root joined with the
//! lower-cased key plus a fixed extension. Resolvers must distinguish "key
//! absent from the store" (a user/config fault, [`Error::TemplateNotFound`])
//! from an I/O failure reading an existing resource ([`Error::Io`]); callers
//! classify failures on that distinction.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::request::TemplateKey;

/// An open resource handle bound to one template key.
///
/// Owned exclusively by the compile step that consumes it. [`into_bytes`]
/// takes the resource by value, so the handle is released on every exit
/// path, success or failure; no handle outlives the compile call.
///
/// [`into_bytes`]: ResolvedResource::into_bytes
pub struct ResolvedResource {
    key: TemplateKey,
    origin: String,
    reader: Box<dyn Read + Send>,
}

impl ResolvedResource {
    /// Bind an open byte stream to `key`. `origin` is the locator used for
    /// diagnostics (a path, or a logical name for in-memory stores).
    pub fn new(key: TemplateKey, origin: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        ResolvedResource {
            key,
            origin: origin.into(),
            reader,
        }
    }

    /// The key this resource resolves.
    pub fn key(&self) -> &TemplateKey {
        &self.key
    }

    /// The locator the resource was opened from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Drain the stream into memory, consuming and closing the handle.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl fmt::Debug for ResolvedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedResource")
            .field("key", &self.key)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Maps a template key to an open resource.
pub trait ResourceResolver: Send + Sync {
    /// Resolve `key` to an open resource.
    ///
    /// Returns [`Error::TemplateNotFound`] when the store has no entry for
    /// the key, and [`Error::Io`] for failures opening an entry that exists.
    fn resolve(&self, key: &TemplateKey) -> Result<ResolvedResource>;
}

/// Default filename extension for template resources.
pub const DEFAULT_TEMPLATE_EXTENSION: &str = "tpl";

/// Resolves keys against a directory of template files.
///
/// The resource path is `<root>/<normalized key>.<extension>`.
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
    extension: String,
}

impl FileResolver {
    /// Resolve templates under `root` with the default extension.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileResolver {
            root: root.into(),
            extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
        }
    }

    /// Override the filename extension (without the leading dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The path a key resolves to, whether or not it exists.
    pub fn path_for(&self, key: &TemplateKey) -> PathBuf {
        self.root.join(format!("{}.{}", key.as_str(), self.extension))
    }

    /// The template root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceResolver for FileResolver {
    fn resolve(&self, key: &TemplateKey) -> Result<ResolvedResource> {
        let path = self.path_for(key);
        match File::open(&path) {
            Ok(file) => {
                log::debug!("resolved template '{}' to {}", key, path.display());
                Ok(ResolvedResource::new(
                    key.clone(),
                    path.display().to_string(),
                    Box::new(file),
                ))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::TemplateNotFound {
                key: key.to_string(),
                origin: path.display().to_string(),
            }),
            Err(err) => Err(Error::Io(err)),
        }
    }
}

/// An in-memory resource store, used in tests and for embedded templates.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    templates: IndexMap<TemplateKey, Vec<u8>>,
}

impl MemoryResolver {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register template source under `key`.
    pub fn insert(&mut self, key: impl Into<TemplateKey>, source: impl Into<Vec<u8>>) {
        self.templates.insert(key.into(), source.into());
    }

    /// Builder-style [`insert`](MemoryResolver::insert).
    pub fn with(mut self, key: impl Into<TemplateKey>, source: impl Into<Vec<u8>>) -> Self {
        self.insert(key, source);
        self
    }
}

impl ResourceResolver for MemoryResolver {
    fn resolve(&self, key: &TemplateKey) -> Result<ResolvedResource> {
        let origin = format!("memory:{}", key);
        match self.templates.get(key) {
            Some(source) => Ok(ResolvedResource::new(
                key.clone(),
                origin,
                Box::new(io::Cursor::new(source.clone())),
            )),
            None => Err(Error::TemplateNotFound {
                key: key.to_string(),
                origin,
            }),
        }
    }
}
