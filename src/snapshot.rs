//! Persisted DTS snapshots.
//!
//! A snapshot stores the discovered nodes, extended links and role/arcrole
//! definitions as JSON. Restoring re-registers the definitions and re-runs
//! [`DtsContext::finalize`], so every derived index is rebuilt exactly as
//! after a load from source. An extension snapshot carries only what an
//! extension taxonomy adds on top of a base and is layered over the base at
//! restore time.

use crate::context::DtsContext;
use crate::diagnostics::{Diagnostic, DiagnosticSink, ErrorKind};
use crate::linkbase::ExtendedLink;
use crate::model::{LinkId, TaxonomyNode};
use crate::registry::{ArcroleType, RoleType, UsedOn};
use crate::{Error, Result};
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtsSnapshot {
    pub format_version: u32,
    pub created: DateTime<Utc>,
    pub main_namespace: Option<CompactString>,
    /// Main namespace of the base this snapshot extends.
    pub base_taxonomy: Option<CompactString>,
    pub nodes: Vec<TaxonomyNode>,
    pub links: Vec<ExtendedLink>,
    pub role_types: Vec<RoleType>,
    pub arcrole_types: Vec<ArcroleType>,
}

impl DtsSnapshot {
    pub fn capture(ctx: &DtsContext) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            created: Utc::now(),
            main_namespace: ctx.main_namespace.clone(),
            base_taxonomy: None,
            nodes: ctx.nodes().map(|(_, node)| node.clone()).collect(),
            links: ctx.links().to_vec(),
            role_types: ctx.registry().roles().cloned().collect(),
            arcrole_types: ctx.registry().arcroles().cloned().collect(),
        }
    }

    /// Captures what `ctx` adds on top of `base`: nodes of namespaces the
    /// base lacks, links from documents the base lacks and role/arcrole
    /// definitions the base lacks or declares with a different used-on set.
    pub fn capture_extension(ctx: &DtsContext, base: &DtsSnapshot) -> Self {
        let base_namespaces: AHashSet<&str> = base.nodes.iter().map(|n| n.namespace.as_str()).collect();
        let base_documents: AHashSet<&str> = base.links.iter().map(|l| l.document.as_str()).collect();
        let base_roles: AHashMap<&str, &UsedOn> =
            base.role_types.iter().map(|r| (r.uri.as_str(), &r.used_on)).collect();
        let base_arcroles: AHashMap<&str, &UsedOn> =
            base.arcrole_types.iter().map(|a| (a.uri.as_str(), &a.used_on)).collect();

        let mut remap = AHashMap::new();
        let mut links = Vec::new();
        for (i, link) in ctx.links().iter().enumerate() {
            if !base_documents.contains(link.document.as_str()) {
                remap.insert(LinkId(i), LinkId(links.len()));
                links.push(link.clone());
            }
        }

        let nodes = ctx
            .nodes()
            .filter(|(_, node)| !base_namespaces.contains(node.namespace.as_str()))
            .map(|(_, node)| {
                let mut node = node.clone();
                for record in &mut node.linkbases {
                    record.links = record.links.iter().filter_map(|id| remap.get(id).copied()).collect();
                }
                node
            })
            .collect();

        Self {
            format_version: FORMAT_VERSION,
            created: Utc::now(),
            main_namespace: ctx.main_namespace.clone(),
            base_taxonomy: base.main_namespace.clone(),
            nodes,
            links,
            role_types: ctx
                .registry()
                .roles()
                .filter(|r| base_roles.get(r.uri.as_str()) != Some(&&r.used_on))
                .cloned()
                .collect(),
            arcrole_types: ctx
                .registry()
                .arcroles()
                .filter(|a| base_arcroles.get(a.uri.as_str()) != Some(&&a.used_on))
                .cloned()
                .collect(),
        }
    }

    pub fn restore(&self, sink: Arc<dyn DiagnosticSink>) -> Result<DtsContext> {
        self.check_version()?;
        let mut ctx = DtsContext::with_sink(sink);
        self.populate(&mut ctx);
        ctx.main_namespace = self.main_namespace.clone();
        ctx.finalize();
        Ok(ctx)
    }

    /// Restores `base` and layers `extension` over it.
    pub fn restore_extension(
        base: &DtsSnapshot,
        extension: &DtsSnapshot,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<DtsContext> {
        base.check_version()?;
        extension.check_version()?;
        if extension.base_taxonomy != base.main_namespace {
            return Err(Error::Configuration(format!(
                "extension snapshot expects base {:?}, got {:?}",
                extension.base_taxonomy, base.main_namespace
            )));
        }

        let mut ctx = DtsContext::with_sink(sink);
        base.populate(&mut ctx);
        extension.populate(&mut ctx);
        ctx.main_namespace = extension.main_namespace.clone();
        ctx.finalize();
        Ok(ctx)
    }

    fn populate(&self, ctx: &mut DtsContext) {
        for role in &self.role_types {
            if let Err(e) = ctx.registry_mut().register_role(role.clone()) {
                ctx.sink().report(e.to_diagnostic());
            }
        }
        for arcrole in &self.arcrole_types {
            if let Err(e) = ctx.registry_mut().register_arcrole(arcrole.clone()) {
                ctx.sink().report(e.to_diagnostic());
            }
        }

        let offset = ctx.links().len();
        ctx.add_links(self.links.clone());

        for node in &self.nodes {
            if ctx.node_by_namespace(&node.namespace).is_some() {
                ctx.sink().report(
                    Diagnostic::warning(
                        ErrorKind::Configuration,
                        "snapshot:duplicateNamespace",
                        format!("namespace {} already restored", node.namespace),
                    )
                    .with_field("document", &node.location),
                );
                continue;
            }
            let mut node = node.clone();
            for record in &mut node.linkbases {
                for id in &mut record.links {
                    id.0 += offset;
                }
            }
            ctx.add_node(node);
        }
    }

    fn check_version(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(Error::Configuration(format!(
                "unsupported snapshot format {}",
                self.format_version
            )));
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
