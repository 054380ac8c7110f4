// DTS context: node arena, registry, links, derived indexes and caches
use crate::cache::MemoCache;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::dimensions::DefinitionRole;
use crate::drs::{DrsKey, HypercubeTree};
use crate::label::LabelKey;
use crate::linkbase::{ExtendedLink, Href, LinkKind, Resource};
use crate::model::{Element, ElementClass, LinkId, NodeId, QName, TaxonomyNode, TypeDef};
use crate::ns;
use crate::registry::RoleRegistry;
use crate::relationships::{Endpoint, EndpointResolver, Relationship, RelationshipIndex};
use crate::types::TypeSystem;
use ahash::AHashMap;
use compact_str::CompactString;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Owns everything discovered for one DTS. Nodes are addressed by
/// [`NodeId`] and links by [`LinkId`]; both are stable for the lifetime of
/// the context.
pub struct DtsContext {
    nodes: Vec<TaxonomyNode>,
    by_namespace: AHashMap<CompactString, NodeId>,
    by_location: AHashMap<String, NodeId>,
    registry: RoleRegistry,
    links: Vec<ExtendedLink>,
    resources: AHashMap<(String, CompactString), Resource>,
    relationships: RelationshipIndex,
    definition_roles: BTreeMap<CompactString, DefinitionRole>,
    classes: AHashMap<QName, ElementClass>,
    pub main_namespace: Option<CompactString>,
    sink: Arc<dyn DiagnosticSink>,
    pub(crate) drs_cache: MemoCache<DrsKey, Arc<HypercubeTree>>,
    pub(crate) label_cache: MemoCache<LabelKey, Option<String>>,
}

impl DtsContext {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            nodes: Vec::new(),
            by_namespace: AHashMap::new(),
            by_location: AHashMap::new(),
            registry: RoleRegistry::new(),
            links: Vec::new(),
            resources: AHashMap::new(),
            relationships: RelationshipIndex::default(),
            definition_roles: BTreeMap::new(),
            classes: AHashMap::new(),
            main_namespace: None,
            sink,
            drs_cache: MemoCache::new(),
            label_cache: MemoCache::new(),
        }
    }

    #[inline]
    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    pub fn shared_sink(&self) -> Arc<dyn DiagnosticSink> {
        Arc::clone(&self.sink)
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Adds a node for a namespace not yet in the DTS.
    pub fn add_node(&mut self, node: TaxonomyNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.by_namespace.insert(node.namespace.clone(), id);
        for document in &node.documents {
            self.by_location.insert(document.clone(), id);
        }
        self.nodes.push(node);
        id
    }

    /// Records another document (an include) as part of node `id`.
    pub fn register_location(&mut self, location: &str, id: NodeId) {
        self.by_location.insert(location.to_string(), id);
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.documents.insert(location.to_string());
        }
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&TaxonomyNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TaxonomyNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TaxonomyNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_by_namespace(&self, namespace: &str) -> Option<NodeId> {
        self.by_namespace.get(namespace).copied()
    }

    pub fn node_by_location(&self, location: &str) -> Option<NodeId> {
        self.by_location.get(location).copied()
    }

    // ------------------------------------------------------------------
    // Registry and links
    // ------------------------------------------------------------------

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RoleRegistry {
        &mut self.registry
    }

    pub fn add_links(&mut self, links: Vec<ExtendedLink>) -> Vec<LinkId> {
        let mut ids = Vec::with_capacity(links.len());
        for link in links {
            for resource in link.resources.values().flatten() {
                if let Some(id) = &resource.id {
                    self.resources
                        .insert((link.document.clone(), id.clone()), resource.clone());
                }
            }
            ids.push(LinkId(self.links.len()));
            self.links.push(link);
        }
        ids
    }

    pub fn links(&self) -> &[ExtendedLink] {
        &self.links
    }

    pub fn link(&self, id: LinkId) -> Option<&ExtendedLink> {
        self.links.get(id.0)
    }

    // ------------------------------------------------------------------
    // Derived state
    // ------------------------------------------------------------------

    /// Rebuilds every derived index and drops memoized query results.
    pub fn finalize(&mut self) {
        let relationships = RelationshipIndex::build(&self.links, &*self, self.sink.as_ref());
        self.relationships = relationships;

        let per_node: Vec<BTreeMap<CompactString, DefinitionRole>> = self
            .nodes
            .iter()
            .map(|node| {
                let links = node
                    .linkbases
                    .iter()
                    .flat_map(|record| record.links.iter())
                    .filter_map(|id| self.links.get(id.0));
                DefinitionRole::collect(links, &*self)
            })
            .collect();
        for (node, roles) in self.nodes.iter_mut().zip(per_node) {
            node.definition_roles = roles;
        }

        self.definition_roles = DefinitionRole::collect(self.links.iter(), &*self);

        let classes: AHashMap<QName, ElementClass> = self
            .nodes
            .iter()
            .flat_map(|node| node.elements.values())
            .map(|element| (element.name.clone(), self.classify(&element.name)))
            .collect();
        self.classes = classes;

        self.drs_cache.clear();
        self.label_cache.clear();

        tracing::info!(
            nodes = self.nodes.len(),
            links = self.links.len(),
            relationships = self.relationships.len(),
            definition_roles = self.definition_roles.len(),
            "DTS finalized"
        );
    }

    pub fn relationships(&self) -> &RelationshipIndex {
        &self.relationships
    }

    /// DTS-wide table of one definition role.
    pub fn definition_role(&self, role: &str) -> Option<&DefinitionRole> {
        self.definition_roles.get(role)
    }

    pub fn definition_roles(&self) -> impl Iterator<Item = &DefinitionRole> {
        self.definition_roles.values()
    }

    /// Table of one role built from node `id`'s own linkbases only, before
    /// any other node's arcs override it.
    pub fn node_definition_role(&self, id: NodeId, role: &str) -> Option<&DefinitionRole> {
        self.node(id)?.definition_roles.get(role)
    }

    /// Class decided during finalize; unknown names are `Other`.
    pub fn class_of(&self, name: &QName) -> ElementClass {
        self.classes.get(name).copied().unwrap_or(ElementClass::Other)
    }

    pub fn presentation_children(&self, parent: &QName, role: &str) -> Vec<&Relationship> {
        self.relationships
            .children_of(&LinkKind::Presentation, role, ns::PARENT_CHILD, parent)
    }

    pub fn calculation_children(&self, parent: &QName, role: &str) -> Vec<&Relationship> {
        self.relationships
            .children_of(&LinkKind::Calculation, role, ns::SUMMATION_ITEM, parent)
    }

    pub fn drs_cache_stats(&self) -> (usize, usize) {
        (self.drs_cache.hits(), self.drs_cache.misses())
    }
}

impl Default for DtsContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointResolver for DtsContext {
    fn resolve_href(&self, href: &Href) -> Option<Endpoint> {
        let fragment = href.fragment.as_ref()?;
        if let Some(element) = self
            .node_by_location(&href.document)
            .and_then(|id| self.node(id))
            .and_then(|node| node.element_by_id(fragment))
        {
            return Some(Endpoint::Concept(element.name.clone()));
        }
        self.resources
            .get(&(href.document.clone(), fragment.clone()))
            .cloned()
            .map(Endpoint::Resource)
    }
}

impl TypeSystem for DtsContext {
    fn element(&self, name: &QName) -> Option<&Element> {
        let id = self.node_by_namespace(&name.namespace)?;
        self.node(id)?.element(&name.local_name)
    }

    fn type_def(&self, name: &QName) -> Option<&TypeDef> {
        let id = self.node_by_namespace(&name.namespace)?;
        self.node(id)?.types.get(&name.local_name)
    }

    fn namespace_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|node| node.prefix.as_deref() == Some(prefix))
            .map(|node| node.namespace.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinkbaseRecord;

    fn element(namespace: &str, local: &str, group: &str) -> Element {
        Element {
            id: Some(CompactString::from(format!("ex_{}", local))),
            name: QName::new(namespace, local),
            type_name: None,
            substitution_group: Some(QName::new(ns::XBRLDT, group)),
            is_abstract: true,
            nillable: true,
            period_type: None,
            balance: None,
            typed_domain_ref: None,
            document: "ex.xsd".to_string(),
        }
    }

    #[test]
    fn test_node_lookup_and_endpoints() {
        let mut ctx = DtsContext::new();
        let mut node = TaxonomyNode::new("http://ex", "ex.xsd");
        node.prefix = Some(CompactString::from("ex"));
        node.add_element(element("http://ex", "Cube", "hypercubeItem"));
        let id = ctx.add_node(node);
        ctx.register_location("ex-part.xsd", id);

        assert_eq!(ctx.node_by_namespace("http://ex"), Some(id));
        assert_eq!(ctx.node_by_location("ex-part.xsd"), Some(id));
        assert!(ctx.node(id).unwrap().documents.contains("ex-part.xsd"));

        let endpoint = ctx.resolve_href(&Href::parse("", "ex.xsd#ex_Cube"));
        assert_eq!(endpoint, Some(Endpoint::Concept(QName::new("http://ex", "Cube"))));
        assert!(ctx.resolve_href(&Href::parse("", "ex.xsd")).is_none());
        assert!(ctx.get_element("Cube", "ex").is_some());

        ctx.finalize();
        assert_eq!(ctx.class_of(&QName::new("http://ex", "Cube")), ElementClass::Hypercube);
        assert_eq!(ctx.class_of(&QName::new("http://ex", "Nope")), ElementClass::Other);
    }

    #[test]
    fn test_links_attach_to_node_records() {
        let mut ctx = DtsContext::new();
        let id = ctx.add_node(TaxonomyNode::new("http://ex", "ex.xsd"));
        let link = ExtendedLink::new(
            LinkKind::Definition,
            QName::new(ns::LINK, "definitionLink"),
            ns::STANDARD_LINK_ROLE,
            "ex-def.xml",
        );
        let ids = ctx.add_links(vec![link]);
        ctx.node_mut(id).unwrap().linkbases.push(LinkbaseRecord {
            location: "ex-def.xml".to_string(),
            role: None,
            embedded: false,
            links: ids.clone(),
        });
        ctx.finalize();

        assert_eq!(ids, vec![LinkId(0)]);
        assert_eq!(ctx.link(LinkId(0)).unwrap().document, "ex-def.xml");
        assert!(ctx.relationships().is_empty());
        assert!(ctx.definition_role(ns::STANDARD_LINK_ROLE).is_none());
    }
}
