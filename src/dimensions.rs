//! Definition-role tables for XBRL Dimensions.
//!
//! A [`DefinitionRole`] holds the dimensional edges of one link role,
//! grouped by equivalence key so that tables from different taxonomies can
//! be merged with the same priority/prohibition rule as plain arcs. The
//! effective edges and the node categories are derived by [`rebuild`].
//!
//! [`rebuild`]: DefinitionRole::rebuild

use crate::linkbase::{
    select_effective, EndpointKey, EquivalenceKey, ExtendedLink, LinkKind, Overridable,
};
use crate::model::QName;
use crate::ns;
use crate::relationships::EndpointResolver;
use compact_str::CompactString;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DrsArcrole {
    All,
    NotAll,
    HypercubeDimension,
    DimensionDomain,
    DomainMember,
    DimensionDefault,
}

impl DrsArcrole {
    pub fn parse(uri: &str) -> Option<Self> {
        match uri {
            ns::ALL => Some(Self::All),
            ns::NOT_ALL => Some(Self::NotAll),
            ns::HYPERCUBE_DIMENSION => Some(Self::HypercubeDimension),
            ns::DIMENSION_DOMAIN => Some(Self::DimensionDomain),
            ns::DOMAIN_MEMBER => Some(Self::DomainMember),
            ns::DIMENSION_DEFAULT => Some(Self::DimensionDefault),
            _ => None,
        }
    }

    pub fn uri(self) -> &'static str {
        match self {
            Self::All => ns::ALL,
            Self::NotAll => ns::NOT_ALL,
            Self::HypercubeDimension => ns::HYPERCUBE_DIMENSION,
            Self::DimensionDomain => ns::DIMENSION_DOMAIN,
            Self::DomainMember => ns::DOMAIN_MEMBER,
            Self::DimensionDefault => ns::DIMENSION_DEFAULT,
        }
    }

    /// `all` and `notAll` link a primary item to a hypercube.
    #[inline]
    pub fn is_has_hypercube(self) -> bool {
        matches!(self, Self::All | Self::NotAll)
    }
}

impl fmt::Display for DrsArcrole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrsEdge {
    pub arcrole: DrsArcrole,
    pub from: QName,
    pub to: QName,
    pub target_role: Option<CompactString>,
    pub order: f64,
    pub priority: i32,
    pub prohibited: bool,
    pub usable: bool,
    pub closed: bool,
    pub context_element: Option<CompactString>,
    pub document: String,
    pub key: EquivalenceKey,
}

impl Overridable for DrsEdge {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_prohibited(&self) -> bool {
        self.prohibited
    }
}

/// A node found in more than one category of the same role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryConflict {
    pub node: QName,
    pub categories: Vec<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct DefinitionRole {
    pub role: CompactString,
    /// Candidates at the highest priority seen for each key, prohibitions
    /// included.
    groups: BTreeMap<EquivalenceKey, Vec<DrsEdge>>,
    unusable: BTreeSet<QName>,
    effective: Vec<DrsEdge>,
    outgoing: BTreeMap<QName, Vec<usize>>,
    incoming: BTreeMap<QName, Vec<usize>>,
    primary_items: BTreeSet<QName>,
    hypercubes: BTreeSet<QName>,
    dimensions: BTreeSet<QName>,
    members: BTreeSet<QName>,
    conflicts: Vec<CategoryConflict>,
}

impl DefinitionRole {
    pub fn new(role: &str) -> Self {
        Self {
            role: CompactString::from(role),
            ..Default::default()
        }
    }

    /// Collects the dimensional edges of `links` into one table per role.
    /// Endpoints that do not resolve to concepts are skipped.
    pub fn collect<'a, I>(links: I, resolver: &dyn EndpointResolver) -> BTreeMap<CompactString, Self>
    where
        I: IntoIterator<Item = &'a ExtendedLink>,
    {
        let mut roles: BTreeMap<CompactString, Self> = BTreeMap::new();
        for link in links {
            if link.kind != LinkKind::Definition {
                continue;
            }
            for arc in link.arcs() {
                let Some(arcrole) = DrsArcrole::parse(&arc.arcrole) else {
                    continue;
                };
                let froms = concepts(link, &arc.from, resolver);
                let tos = concepts(link, &arc.to, resolver);
                let table = roles
                    .entry(link.role.clone())
                    .or_insert_with(|| Self::new(&link.role));
                for from in &froms {
                    for to in &tos {
                        let key = EquivalenceKey::new(
                            arc,
                            EndpointKey::Concept(from.clone()),
                            EndpointKey::Concept(to.clone()),
                        );
                        table.insert(DrsEdge {
                            arcrole,
                            from: from.clone(),
                            to: to.clone(),
                            target_role: arc.target_role.clone(),
                            order: arc.order,
                            priority: arc.priority,
                            prohibited: arc.is_prohibited(),
                            usable: arc.usable.unwrap_or(true),
                            closed: arc.closed.unwrap_or(false),
                            context_element: arc.context_element.clone(),
                            document: link.document.clone(),
                            key,
                        });
                    }
                }
            }
        }
        for table in roles.values_mut() {
            table.rebuild();
        }
        roles
    }

    /// Adds a candidate. Lower-priority candidates are dropped; a higher
    /// priority replaces what was there. Call [`rebuild`](Self::rebuild)
    /// afterwards.
    pub fn insert(&mut self, edge: DrsEdge) {
        let group = self.groups.entry(edge.key.clone()).or_default();
        match group.first().map(|e| e.priority) {
            Some(current) if current > edge.priority => {}
            Some(current) if current < edge.priority => {
                group.clear();
                group.push(edge);
            }
            _ => group.push(edge),
        }
    }

    /// Directional merge: equivalent edges compete by priority, at equal
    /// priority `self`'s candidates stay first so its instance survives.
    /// Unusable members are unioned.
    pub fn merge(&self, other: &DefinitionRole) -> DefinitionRole {
        let mut merged = self.clone();
        for candidates in other.groups.values() {
            for edge in candidates {
                merged.insert(edge.clone());
            }
        }
        merged.unusable.extend(other.unusable.iter().cloned());
        merged.rebuild();
        merged
    }

    /// Copy of this table without the edges reachable from `node`.
    pub fn without_downstream(&self, node: &QName) -> DefinitionRole {
        let reachable = self.reachable_from(node);
        let mut pruned = self.clone();
        pruned.groups.retain(|_, candidates| {
            candidates
                .first()
                .map_or(false, |edge| !reachable.contains(&edge.from))
        });
        pruned.rebuild();
        pruned
    }

    fn reachable_from(&self, node: &QName) -> BTreeSet<QName> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([node.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for &i in self.outgoing.get(&current).into_iter().flatten() {
                queue.push_back(self.effective[i].to.clone());
            }
        }
        seen
    }

    /// Recomputes effective edges, indexes and node categories.
    pub fn rebuild(&mut self) {
        let mut effective: Vec<DrsEdge> = Vec::new();
        for candidates in self.groups.values() {
            // equivalent survivors carry the same relationship; keep the first
            if let Some(edge) = select_effective(candidates).first() {
                effective.push((*edge).clone());
            }
        }
        effective.sort_by(|a, b| {
            a.from
                .cmp(&b.from)
                .then_with(|| a.arcrole.cmp(&b.arcrole))
                .then_with(|| a.order.total_cmp(&b.order))
                .then_with(|| a.to.cmp(&b.to))
        });

        self.outgoing.clear();
        self.incoming.clear();
        for (i, edge) in effective.iter().enumerate() {
            self.outgoing.entry(edge.from.clone()).or_default().push(i);
            self.incoming.entry(edge.to.clone()).or_default().push(i);
            if !edge.usable
                && matches!(
                    edge.arcrole,
                    DrsArcrole::DomainMember | DrsArcrole::DimensionDomain
                )
            {
                self.unusable.insert(edge.to.clone());
            }
        }
        self.effective = effective;
        self.classify();
    }

    fn classify(&mut self) {
        let mut primary = BTreeSet::new();
        let mut hypercubes = BTreeSet::new();
        let mut dimensions = BTreeSet::new();
        let mut domains = BTreeSet::new();

        for edge in &self.effective {
            match edge.arcrole {
                DrsArcrole::All | DrsArcrole::NotAll => {
                    primary.insert(edge.from.clone());
                    hypercubes.insert(edge.to.clone());
                }
                DrsArcrole::HypercubeDimension => {
                    hypercubes.insert(edge.from.clone());
                    dimensions.insert(edge.to.clone());
                }
                DrsArcrole::DimensionDomain | DrsArcrole::DimensionDefault => {
                    dimensions.insert(edge.from.clone());
                    domains.insert(edge.to.clone());
                }
                DrsArcrole::DomainMember => {}
            }
        }

        let primary = self.domain_member_closure(primary);
        let members: BTreeSet<QName> = self
            .domain_member_closure(domains)
            .into_iter()
            .chain(
                self.effective
                    .iter()
                    .filter(|e| e.arcrole == DrsArcrole::DomainMember)
                    .flat_map(|e| [e.from.clone(), e.to.clone()]),
            )
            .filter(|n| !primary.contains(n))
            .collect();

        let mut conflicts = Vec::new();
        let all_nodes: BTreeSet<&QName> = primary
            .iter()
            .chain(&hypercubes)
            .chain(&dimensions)
            .chain(&members)
            .collect();
        for node in all_nodes {
            let categories: Vec<&'static str> = [
                ("primary item", primary.contains(node)),
                ("hypercube", hypercubes.contains(node)),
                ("dimension", dimensions.contains(node)),
                ("member", members.contains(node)),
            ]
            .into_iter()
            .filter_map(|(name, hit)| hit.then_some(name))
            .collect();
            if categories.len() > 1 {
                conflicts.push(CategoryConflict {
                    node: node.clone(),
                    categories,
                });
            }
        }

        self.primary_items = primary;
        self.hypercubes = hypercubes;
        self.dimensions = dimensions;
        self.members = members;
        self.conflicts = conflicts;
    }

    fn domain_member_closure(&self, seeds: BTreeSet<QName>) -> BTreeSet<QName> {
        let mut closure = BTreeSet::new();
        let mut queue: VecDeque<QName> = seeds.into_iter().collect();
        while let Some(node) = queue.pop_front() {
            if !closure.insert(node.clone()) {
                continue;
            }
            for edge in self.edges_from(&node, DrsArcrole::DomainMember) {
                queue.push_back(edge.to.clone());
            }
        }
        closure
    }

    /// Effective edges of `arcrole` leaving `node`, in `order`.
    pub fn edges_from(&self, node: &QName, arcrole: DrsArcrole) -> Vec<&DrsEdge> {
        self.outgoing
            .get(node)
            .into_iter()
            .flatten()
            .map(|&i| &self.effective[i])
            .filter(|e| e.arcrole == arcrole)
            .collect()
    }

    pub fn edges_to(&self, node: &QName, arcrole: DrsArcrole) -> Vec<&DrsEdge> {
        self.incoming
            .get(node)
            .into_iter()
            .flatten()
            .map(|&i| &self.effective[i])
            .filter(|e| e.arcrole == arcrole)
            .collect()
    }

    pub fn has_hypercube_edges(&self, primary: &QName) -> Vec<&DrsEdge> {
        self.outgoing
            .get(primary)
            .into_iter()
            .flatten()
            .map(|&i| &self.effective[i])
            .filter(|e| e.arcrole.is_has_hypercube())
            .collect()
    }

    pub fn effective_edges(&self) -> &[DrsEdge] {
        &self.effective
    }

    pub fn is_unusable(&self, member: &QName) -> bool {
        self.unusable.contains(member)
    }

    pub fn primary_items(&self) -> &BTreeSet<QName> {
        &self.primary_items
    }

    pub fn hypercubes(&self) -> &BTreeSet<QName> {
        &self.hypercubes
    }

    pub fn dimensions(&self) -> &BTreeSet<QName> {
        &self.dimensions
    }

    pub fn members(&self) -> &BTreeSet<QName> {
        &self.members
    }

    pub fn conflicts(&self) -> &[CategoryConflict] {
        &self.conflicts
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn concepts(link: &ExtendedLink, label: &str, resolver: &dyn EndpointResolver) -> Vec<QName> {
    link.locators
        .get(label)
        .into_iter()
        .flatten()
        .filter_map(|href| resolver.resolve_href(href))
        .filter_map(|endpoint| endpoint.concept().cloned())
        .collect()
}
