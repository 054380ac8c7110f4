//! DTS discovery.
//!
//! Schemas are processed from a work queue (entry points, imports,
//! includes). Linkbases referenced by the discovered schemas are then
//! fetched, parsed and resolved into extended links. Locators, roleRefs
//! and arcroleRefs that point at schemas outside the DTS are queued and the
//! two passes repeat until nothing new turns up.

use crate::context::DtsContext;
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::fetch::{normalize_location, resolve_location, split_href, DocumentFetcher};
use crate::linkbase::ExtendedLinkResolver;
use crate::model::{LinkbaseRecord, NodeId, TaxonomyNode};
use crate::schema::{IndexedSchema, SchemaIndexer};
use crate::xml::{DocumentParser, XmlNode};
use crate::{ns, Error, Result};
use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub load_linkbases: bool,
    pub locator_discovery: bool,
    pub parallel: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_linkbases: true,
            locator_discovery: true,
            parallel: cfg!(feature = "parallel"),
        }
    }
}

impl LoaderConfig {
    pub fn with_linkbases(mut self, enabled: bool) -> Self {
        self.load_linkbases = enabled;
        self
    }

    pub fn with_locator_discovery(mut self, enabled: bool) -> Self {
        self.locator_discovery = enabled;
        self
    }

    pub fn with_parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }
}

/// Result of a load: the nodes of the entry points and what was read.
#[derive(Debug, Clone, PartialEq)]
pub struct DtsHandle {
    pub entry_nodes: Vec<NodeId>,
    pub schemas: usize,
    pub linkbases: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Entry,
    Import,
    Include(NodeId),
    Locator,
}

struct Pending {
    location: String,
    origin: Origin,
}

pub struct DtsLoader<'a> {
    ctx: &'a mut DtsContext,
    fetcher: &'a dyn DocumentFetcher,
    parser: &'a dyn DocumentParser,
    config: LoaderConfig,
    seen_schemas: AHashSet<String>,
    loaded_linkbases: AHashSet<String>,
    embedded: AHashMap<String, XmlNode>,
}

impl<'a> DtsLoader<'a> {
    pub fn new(
        ctx: &'a mut DtsContext,
        fetcher: &'a dyn DocumentFetcher,
        parser: &'a dyn DocumentParser,
    ) -> Self {
        Self {
            ctx,
            fetcher,
            parser,
            config: LoaderConfig::default(),
            seen_schemas: AHashSet::new(),
            loaded_linkbases: AHashSet::new(),
            embedded: AHashMap::new(),
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the DTS rooted at `entries` and finalizes the context. Only an
    /// unreadable entry point is fatal.
    pub fn load(&mut self, entries: &[&str]) -> Result<DtsHandle> {
        if entries.is_empty() {
            return Err(Error::Configuration("no entry points given".to_string()));
        }

        let mut entry_nodes = Vec::with_capacity(entries.len());
        let mut queue = VecDeque::new();
        for entry in entries {
            let location = normalize_location(entry);
            if let Some(id) = self.load_schema(&location, Origin::Entry, &mut queue)? {
                entry_nodes.push(id);
            }
        }
        if self.ctx.main_namespace.is_none() {
            self.ctx.main_namespace = entry_nodes
                .first()
                .and_then(|id| self.ctx.node(*id))
                .map(|node| node.namespace.clone());
        }

        loop {
            self.drain(&mut queue)?;
            if !self.config.load_linkbases {
                break;
            }

            let pending = self.pending_linkbases();
            if pending.is_empty() {
                break;
            }
            let trees = self.parse_linkbases(pending);

            if self.config.locator_discovery {
                for (location, tree) in &trees {
                    for schema in self.discoverable_schemas(tree, location) {
                        queue.push_back(Pending {
                            location: schema,
                            origin: Origin::Locator,
                        });
                    }
                }
                // roleRef targets must be registered before the links are resolved
                self.drain(&mut queue)?;
            }

            for (location, tree) in trees {
                self.resolve_linkbase(&location, &tree);
            }
        }

        self.ctx.finalize();

        let handle = DtsHandle {
            entry_nodes,
            schemas: self.seen_schemas.len(),
            linkbases: self.loaded_linkbases.len(),
        };
        tracing::info!(
            schemas = handle.schemas,
            linkbases = handle.linkbases,
            nodes = self.ctx.node_count(),
            "DTS loaded"
        );
        Ok(handle)
    }

    fn drain(&mut self, queue: &mut VecDeque<Pending>) -> Result<()> {
        while let Some(next) = queue.pop_front() {
            self.load_schema(&next.location, next.origin, queue)?;
        }
        Ok(())
    }

    fn load_schema(
        &mut self,
        location: &str,
        origin: Origin,
        queue: &mut VecDeque<Pending>,
    ) -> Result<Option<NodeId>> {
        if !self.seen_schemas.insert(location.to_string()) {
            if let Origin::Include(id) = origin {
                if self.ctx.node_by_location(location) != Some(id) {
                    tracing::debug!(location, "include already loaded under another node");
                }
            }
            return Ok(self.ctx.node_by_location(location));
        }

        let root = match self.read(location) {
            Ok(root) => root,
            Err(e) if origin == Origin::Entry => {
                return Err(Error::Configuration(format!(
                    "entry point {} could not be read: {}",
                    location, e
                )))
            }
            Err(e) => {
                self.report_unreadable(location, &e);
                return Ok(None);
            }
        };

        let chameleon = match origin {
            Origin::Include(id) => self.ctx.node(id).map(|n| n.namespace.to_string()),
            _ => None,
        };
        let indexed = SchemaIndexer::new(self.ctx.sink()).index(&root, location, chameleon.as_deref());
        let schema = match indexed {
            Ok(schema) => schema,
            Err(e) if origin == Origin::Entry => {
                return Err(Error::Configuration(format!(
                    "entry point {} is not a schema: {}",
                    location, e
                )))
            }
            Err(e) => {
                if origin == Origin::Locator {
                    tracing::debug!(location, "locator target is not a schema");
                } else {
                    self.ctx.sink().report(
                        Diagnostic::error(ErrorKind::Structural, "dts:notASchema", e.to_string())
                            .with_field("document", location),
                    );
                }
                return Ok(None);
            }
        };

        let id = match origin {
            Origin::Include(id) => {
                self.ctx.register_location(location, id);
                id
            }
            _ => match self.ctx.node_by_namespace(&schema.target_namespace) {
                Some(existing) => {
                    tracing::debug!(
                        location,
                        namespace = %schema.target_namespace,
                        "namespace already in DTS, reusing node"
                    );
                    self.ctx.register_location(location, existing);
                    return Ok(Some(existing));
                }
                None => {
                    let mut node = TaxonomyNode::new(&schema.target_namespace, location);
                    node.prefix = schema.prefix.clone();
                    self.ctx.add_node(node)
                }
            },
        };

        for import in &schema.imports {
            queue.push_back(Pending {
                location: import.location.clone(),
                origin: Origin::Import,
            });
        }
        for include in &schema.includes {
            queue.push_back(Pending {
                location: include.clone(),
                origin: Origin::Include(id),
            });
        }
        if schema.has_embedded_linkbases {
            self.embedded.insert(location.to_string(), root);
        }
        self.merge_into(id, schema);
        Ok(Some(id))
    }

    fn merge_into(&mut self, id: NodeId, schema: IndexedSchema) {
        for role in &schema.role_types {
            if let Err(e) = self.ctx.registry_mut().register_role(role.clone()) {
                self.ctx.sink().report(e.to_diagnostic());
            }
        }
        for arcrole in &schema.arcrole_types {
            if let Err(e) = self.ctx.registry_mut().register_arcrole(arcrole.clone()) {
                self.ctx.sink().report(e.to_diagnostic());
            }
        }

        let sink = self.ctx.shared_sink();
        let Some(node) = self.ctx.node_mut(id) else {
            return;
        };
        for element in schema.elements {
            if node.elements.contains_key(&element.name.local_name) {
                sink.report(
                    Diagnostic::error(
                        ErrorKind::Structural,
                        "xmlschema:duplicateElement",
                        format!("element {} declared twice", element.name),
                    )
                    .with_field("document", &schema.location),
                );
                continue;
            }
            node.add_element(element);
        }
        for type_def in schema.types {
            node.types.insert(type_def.name.local_name.clone(), type_def);
        }
        node.role_types.extend(schema.role_types);
        node.arcrole_types.extend(schema.arcrole_types);
        node.imports.extend(schema.imports.into_iter().map(|i| i.location));
        node.includes.extend(schema.includes);
        for linkbase in schema.linkbase_refs {
            node.linkbases.push(LinkbaseRecord {
                location: linkbase.location,
                role: linkbase.role,
                embedded: false,
                links: Vec::new(),
            });
        }
        if schema.has_embedded_linkbases {
            node.linkbases.push(LinkbaseRecord {
                location: schema.location,
                role: None,
                embedded: true,
                links: Vec::new(),
            });
        }
    }

    /// Linkbase records not yet read, each location once.
    fn pending_linkbases(&mut self) -> Vec<(String, Option<XmlNode>)> {
        let mut pending = Vec::new();
        let records: Vec<(String, bool)> = self
            .ctx
            .nodes()
            .flat_map(|(_, node)| node.linkbases.iter())
            .map(|record| (record.location.clone(), record.embedded))
            .collect();
        for (location, embedded) in records {
            if !self.loaded_linkbases.insert(location.clone()) {
                continue;
            }
            if embedded {
                if let Some(root) = self.embedded.remove(&location) {
                    pending.push((location, Some(root)));
                }
            } else {
                pending.push((location, None));
            }
        }
        pending
    }

    fn parse_linkbases(&self, pending: Vec<(String, Option<XmlNode>)>) -> Vec<(String, XmlNode)> {
        let fetcher = self.fetcher;
        let parser = self.parser;
        let read = move |(location, tree): (String, Option<XmlNode>)| {
            let result = match tree {
                Some(tree) => Ok(tree),
                None => read_document(fetcher, parser, &location),
            };
            (location, result)
        };

        #[cfg(feature = "parallel")]
        let results: Vec<(String, Result<XmlNode>)> = if self.config.parallel {
            use rayon::prelude::*;
            pending.into_par_iter().map(read).collect()
        } else {
            pending.into_iter().map(read).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<(String, Result<XmlNode>)> = pending.into_iter().map(read).collect();

        results
            .into_iter()
            .filter_map(|(location, result)| match result {
                Ok(tree) => Some((location, tree)),
                Err(e) => {
                    self.report_unreadable(&location, &e);
                    None
                }
            })
            .collect()
    }

    fn resolve_linkbase(&mut self, location: &str, tree: &XmlNode) {
        let links = ExtendedLinkResolver::new(self.ctx.registry(), self.ctx.sink())
            .resolve_all(tree, location);
        tracing::debug!(location, links = links.len(), "resolved linkbase");
        let ids = self.ctx.add_links(links);
        for index in 0..self.ctx.node_count() {
            if let Some(node) = self.ctx.node_mut(NodeId(index)) {
                for record in node.linkbases.iter_mut().filter(|r| r.location == location) {
                    record.links.extend(ids.iter().copied());
                }
            }
        }
    }

    /// Schema documents referenced from a linkbase that are not in the DTS.
    fn discoverable_schemas(&self, tree: &XmlNode, location: &str) -> Vec<String> {
        let mut found = Vec::new();
        for node in tree.descendants() {
            let is_reference = node.is(ns::LINK, "roleRef")
                || node.is(ns::LINK, "arcroleRef")
                || node.xlink("type") == Some("locator");
            if !is_reference {
                continue;
            }
            let Some(href) = node.xlink("href") else {
                continue;
            };
            let (document, _) = split_href(href);
            if document.is_empty() {
                continue;
            }
            let target = resolve_location(location, document);
            if !self.seen_schemas.contains(&target)
                && !self.loaded_linkbases.contains(&target)
                && !found.contains(&target)
            {
                found.push(target);
            }
        }
        found
    }

    fn read(&self, location: &str) -> Result<XmlNode> {
        read_document(self.fetcher, self.parser, location)
    }

    fn report_unreadable(&self, location: &str, error: &Error) {
        let (kind, code) = match error {
            Error::Parse(_) => (ErrorKind::Structural, "dts:unparsableDocument"),
            _ => (ErrorKind::Reference, "dts:documentNotFound"),
        };
        self.ctx.sink().report(
            Diagnostic::error(kind, code, format!("{} skipped: {}", location, error))
                .with_field("document", location),
        );
    }
}

fn read_document(
    fetcher: &dyn DocumentFetcher,
    parser: &dyn DocumentParser,
    location: &str,
) -> Result<XmlNode> {
    let data = fetcher.fetch(location)?;
    parser.parse(location, &data)
}
