//! Effective relationships per base set.
//!
//! A base set is every arc of one arcrole inside extended links of one
//! kind and role, across the whole DTS. Equivalent arcs compete under
//! [`select_effective`]; the survivors are sorted so the result never
//! depends on the order documents were loaded in.

use crate::diagnostics::{Diagnostic, DiagnosticSink, ErrorKind};
use crate::linkbase::{
    select_effective, Arc, EndpointKey, EquivalenceKey, ExtendedLink, Href, LinkKind,
    Overridable, Resource,
};
use crate::model::{LinkId, QName};
use ahash::AHashSet;
use compact_str::CompactString;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    Concept(QName),
    Resource(Resource),
}

impl Endpoint {
    pub fn key(&self) -> EndpointKey {
        match self {
            Endpoint::Concept(name) => EndpointKey::Concept(name.clone()),
            Endpoint::Resource(resource) => EndpointKey::for_resource(resource),
        }
    }

    pub fn concept(&self) -> Option<&QName> {
        match self {
            Endpoint::Concept(name) => Some(name),
            Endpoint::Resource(_) => None,
        }
    }

    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Endpoint::Resource(resource) => Some(resource),
            Endpoint::Concept(_) => None,
        }
    }
}

/// Resolves locator targets to concepts or remote resources.
pub trait EndpointResolver {
    fn resolve_href(&self, href: &Href) -> Option<Endpoint>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BaseSetKey {
    pub kind: LinkKind,
    pub role: CompactString,
    pub arcrole: CompactString,
}

impl BaseSetKey {
    pub fn new(kind: LinkKind, role: &str, arcrole: &str) -> Self {
        Self {
            kind,
            role: CompactString::from(role),
            arcrole: CompactString::from(arcrole),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub from: Endpoint,
    pub to: Endpoint,
    pub arc: Arc,
    pub link_role: CompactString,
    pub document: String,
    pub link: LinkId,
}

impl Relationship {
    #[inline]
    pub fn order(&self) -> f64 {
        self.arc.order
    }

    pub fn arcrole(&self) -> &str {
        &self.arc.arcrole
    }
}

impl Overridable for Relationship {
    fn priority(&self) -> i32 {
        self.arc.priority
    }

    fn is_prohibited(&self) -> bool {
        self.arc.is_prohibited()
    }
}

#[derive(Debug, Default, Clone)]
pub struct RelationshipIndex {
    sets: BTreeMap<BaseSetKey, Vec<Relationship>>,
    from_concept: BTreeMap<BaseSetKey, BTreeMap<QName, Vec<usize>>>,
    to_concept: BTreeMap<BaseSetKey, BTreeMap<QName, Vec<usize>>>,
}

impl RelationshipIndex {
    pub fn build(
        links: &[ExtendedLink],
        resolver: &dyn EndpointResolver,
        sink: &dyn DiagnosticSink,
    ) -> Self {
        let mut groups: BTreeMap<(BaseSetKey, EquivalenceKey), Vec<Relationship>> =
            BTreeMap::new();
        let mut reported = AHashSet::new();

        for (idx, link) in links.iter().enumerate() {
            for arc in link.arcs() {
                let froms = endpoints(link, &arc.from, resolver, sink, &mut reported);
                let tos = endpoints(link, &arc.to, resolver, sink, &mut reported);
                let base = BaseSetKey::new(link.kind.clone(), &link.role, &arc.arcrole);

                for from in &froms {
                    for to in &tos {
                        let key = EquivalenceKey::new(arc, from.key(), to.key());
                        groups.entry((base.clone(), key)).or_default().push(Relationship {
                            from: from.clone(),
                            to: to.clone(),
                            arc: arc.clone(),
                            link_role: link.role.clone(),
                            document: link.document.clone(),
                            link: LinkId(idx),
                        });
                    }
                }
            }
        }

        let mut sets: BTreeMap<BaseSetKey, Vec<Relationship>> = BTreeMap::new();
        for ((base, _), group) in &groups {
            let survivors = select_effective(group);
            if survivors.is_empty() {
                continue;
            }
            sets.entry(base.clone())
                .or_default()
                .extend(survivors.into_iter().cloned());
        }

        let mut index = Self {
            sets,
            ..Default::default()
        };
        for (base, relationships) in index.sets.iter_mut() {
            relationships.sort_by(compare_relationships);
            let from_map = index.from_concept.entry(base.clone()).or_default();
            let to_map = index.to_concept.entry(base.clone()).or_default();
            for (i, rel) in relationships.iter().enumerate() {
                if let Some(from) = rel.from.concept() {
                    from_map.entry(from.clone()).or_default().push(i);
                }
                if let Some(to) = rel.to.concept() {
                    to_map.entry(to.clone()).or_default().push(i);
                }
            }
        }
        index
    }

    pub fn relationships(&self, kind: &LinkKind, role: &str, arcrole: &str) -> &[Relationship] {
        self.sets
            .get(&BaseSetKey::new(kind.clone(), role, arcrole))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Effective relationships from `concept`, ordered by `order`.
    pub fn children_of(
        &self,
        kind: &LinkKind,
        role: &str,
        arcrole: &str,
        concept: &QName,
    ) -> Vec<&Relationship> {
        self.lookup(&self.from_concept, kind, role, arcrole, concept)
    }

    pub fn parents_of(
        &self,
        kind: &LinkKind,
        role: &str,
        arcrole: &str,
        concept: &QName,
    ) -> Vec<&Relationship> {
        self.lookup(&self.to_concept, kind, role, arcrole, concept)
    }

    fn lookup(
        &self,
        map: &BTreeMap<BaseSetKey, BTreeMap<QName, Vec<usize>>>,
        kind: &LinkKind,
        role: &str,
        arcrole: &str,
        concept: &QName,
    ) -> Vec<&Relationship> {
        let base = BaseSetKey::new(kind.clone(), role, arcrole);
        match (self.sets.get(&base), map.get(&base).and_then(|m| m.get(concept))) {
            (Some(set), Some(indices)) => indices.iter().map(|&i| &set[i]).collect(),
            _ => Vec::new(),
        }
    }

    /// Link roles that have at least one effective relationship of `kind`.
    pub fn link_roles(&self, kind: &LinkKind) -> BTreeSet<&str> {
        self.sets
            .keys()
            .filter(|k| &k.kind == kind)
            .map(|k| k.role.as_str())
            .collect()
    }

    pub fn base_sets(&self) -> impl Iterator<Item = (&BaseSetKey, &[Relationship])> {
        self.sets.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.sets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn compare_relationships(a: &Relationship, b: &Relationship) -> Ordering {
    a.from
        .key()
        .cmp(&b.from.key())
        .then_with(|| a.arc.order.total_cmp(&b.arc.order))
        .then_with(|| a.to.key().cmp(&b.to.key()))
        .then_with(|| a.document.cmp(&b.document))
}

fn endpoints(
    link: &ExtendedLink,
    label: &str,
    resolver: &dyn EndpointResolver,
    sink: &dyn DiagnosticSink,
    reported: &mut AHashSet<Href>,
) -> Vec<Endpoint> {
    let mut out = Vec::new();
    if let Some(hrefs) = link.locators.get(label) {
        for href in hrefs {
            match resolver.resolve_href(href) {
                Some(endpoint) => out.push(endpoint),
                None => {
                    if reported.insert(href.clone()) {
                        sink.report(
                            Diagnostic::error(
                                ErrorKind::Reference,
                                "xbrl.3.5.3.7.2:locatorTarget",
                                format!("locator target {} does not resolve", href),
                            )
                            .with_field("document", &link.document)
                            .with_field("role", &link.role),
                        );
                    }
                }
            }
        }
    }
    if let Some(resources) = link.resources.get(label) {
        out.extend(resources.iter().cloned().map(Endpoint::Resource));
    }
    out
}
