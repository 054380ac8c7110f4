// Document fetch: the only I/O boundary of DTS resolution
use crate::{Error, Result};
use ahash::AHashMap;
#[cfg(feature = "mmap")]
use memmap2::Mmap;
use parking_lot::Mutex;
use std::ops::Deref;
use std::path::PathBuf;

/// Raw document bytes, either owned or memory-mapped.
pub enum Fetched {
    Owned(Vec<u8>),
    #[cfg(feature = "mmap")]
    Mapped(Mmap),
}

impl Deref for Fetched {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Fetched::Owned(bytes) => bytes,
            #[cfg(feature = "mmap")]
            Fetched::Mapped(map) => map,
        }
    }
}

pub trait DocumentFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Fetched>;
}

/// Reads documents from the local filesystem. Relative locations are taken
/// relative to `root` when one is set.
#[derive(Debug, Default, Clone)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = Some(root.into());
        self
    }

    fn path_for(&self, location: &str) -> Result<PathBuf> {
        if location.starts_with("http://") || location.starts_with("https://") {
            return Err(Error::NotFound(format!(
                "remote document {} (only local files are fetched)",
                location
            )));
        }
        let local = location.strip_prefix("file://").unwrap_or(location);
        let path = PathBuf::from(local);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        })
    }
}

impl DocumentFetcher for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Fetched> {
        let path = self.path_for(location)?;

        #[cfg(feature = "mmap")]
        {
            let file = std::fs::File::open(&path)?;
            // Safety: the taxonomy file is treated as read-only for the load
            let map = unsafe { Mmap::map(&file)? };
            Ok(Fetched::Mapped(map))
        }

        #[cfg(not(feature = "mmap"))]
        {
            Ok(Fetched::Owned(std::fs::read(path)?))
        }
    }
}

/// In-memory document store, used by hosts that already hold the taxonomy
/// and by tests.
#[derive(Default)]
pub struct MemoryFetcher {
    documents: AHashMap<String, Vec<u8>>,
    fetched: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, location: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(location, content);
        self
    }

    pub fn insert(&mut self, location: &str, content: impl Into<Vec<u8>>) {
        self.documents
            .insert(normalize_location(location), content.into());
    }

    /// Locations fetched so far, in fetch order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

impl DocumentFetcher for MemoryFetcher {
    fn fetch(&self, location: &str) -> Result<Fetched> {
        self.fetched.lock().push(location.to_string());
        self.documents
            .get(&normalize_location(location))
            .map(|bytes| Fetched::Owned(bytes.clone()))
            .ok_or_else(|| Error::NotFound(location.to_string()))
    }
}

/// Splits `doc.xsd#frag` into document and fragment parts.
pub fn split_href(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((doc, frag)) => (doc, Some(frag)),
        None => (href, None),
    }
}

/// Resolves `href` against the location of the referencing document.
/// An empty document part refers to `base` itself.
pub fn resolve_location(base: &str, href: &str) -> String {
    if href.is_empty() {
        return normalize_location(base);
    }
    if href.contains("://") || href.starts_with('/') {
        return normalize_location(href);
    }
    let dir = match base.rfind('/') {
        Some(idx) => &base[..=idx],
        None => "",
    };
    normalize_location(&format!("{}{}", dir, href))
}

/// Collapses `.` and `..` segments, keeping any scheme and authority intact.
pub fn normalize_location(location: &str) -> String {
    let (prefix, path) = match location.find("://") {
        Some(idx) => {
            let after = &location[idx + 3..];
            let host_end = after.find('/').map(|i| idx + 3 + i).unwrap_or(location.len());
            (&location[..host_end], &location[host_end..])
        }
        None => ("", location),
    };

    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = String::with_capacity(location.len());
    out.push_str(prefix);
    if absolute {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    out
}
