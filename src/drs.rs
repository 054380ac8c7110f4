//! Dimensional relationship set resolution.
//!
//! Starting from a primary item and a hypercube in one definition role,
//! the resolver walks hypercube -> dimensions -> domains -> members.
//! Edges carrying `xbrldt:targetRole` continue in the target role: the
//! current table loses everything downstream of the edge's target node and
//! is merged with the target role's table. Resolved hypercube subtrees are
//! memoized per (role, hypercube, target role).

use crate::context::DtsContext;
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::dimensions::{DefinitionRole, DrsArcrole, DrsEdge};
use crate::model::{ElementClass, QName};
use crate::registry::CyclesAllowed;
use compact_str::CompactString;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DimensionError {
    #[error("{primary} is not linked to hypercube {hypercube} in role {role}")]
    NotLinked {
        primary: QName,
        hypercube: QName,
        role: CompactString,
    },

    #[error("target role {target_role} of a {arcrole} arc in role {role} has no relationships")]
    TargetRoleNotResolved {
        role: CompactString,
        target_role: CompactString,
        arcrole: DrsArcrole,
    },

    #[error("directed cycle through {node} on {arcrole} in role {role}")]
    Cycle {
        node: QName,
        arcrole: DrsArcrole,
        role: CompactString,
    },

    #[error("typed dimension {dimension} has a domain")]
    TypedDimensionWithDomain { dimension: QName },

    #[error("dimension {dimension} has {count} default members")]
    TooManyDefaults { dimension: QName, count: usize },
}

impl DimensionError {
    pub fn code(&self) -> &'static str {
        match self {
            DimensionError::NotLinked { .. } => "xbrldte:HypercubeNotLinked",
            DimensionError::TargetRoleNotResolved { .. } => "xbrldte:TargetRoleNotResolvedError",
            DimensionError::Cycle { .. } => "xbrldte:DRSDirectedCycleError",
            DimensionError::TypedDimensionWithDomain { .. } => "xbrldte:TypedDimensionError",
            DimensionError::TooManyDefaults { .. } => "xbrldte:TooManyDefaultMembersError",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(ErrorKind::Conformance, self.code(), self.to_string())
    }
}

/// Cache key of a resolved hypercube subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DrsKey {
    pub role: CompactString,
    pub hypercube: QName,
    pub target_role: Option<CompactString>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMember {
    pub member: QName,
    pub usable: bool,
    pub children: Vec<ResolvedMember>,
}

impl ResolvedMember {
    fn collect<'a>(&'a self, usable_only: bool, out: &mut Vec<&'a QName>) {
        if !usable_only || self.usable {
            out.push(&self.member);
        }
        for child in &self.children {
            child.collect(usable_only, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDimension {
    pub dimension: QName,
    pub typed: bool,
    pub default: Option<QName>,
    pub domains: Vec<ResolvedMember>,
}

impl ResolvedDimension {
    /// Every domain member in walk order, unusable ones included.
    pub fn members(&self) -> Vec<&QName> {
        let mut out = Vec::new();
        for domain in &self.domains {
            domain.collect(false, &mut out);
        }
        out
    }

    pub fn usable_members(&self) -> Vec<&QName> {
        let mut out = Vec::new();
        for domain in &self.domains {
            domain.collect(true, &mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HypercubeTree {
    pub hypercube: QName,
    pub dimensions: Vec<ResolvedDimension>,
}

impl HypercubeTree {
    pub fn dimension(&self, name: &QName) -> Option<&ResolvedDimension> {
        self.dimensions.iter().find(|d| &d.dimension == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedHypercube {
    pub primary_item: QName,
    pub hypercube: QName,
    pub role: CompactString,
    pub arcrole: DrsArcrole,
    pub closed: bool,
    pub context_element: Option<CompactString>,
    pub tree: Arc<HypercubeTree>,
}

pub struct DrsResolver<'a> {
    ctx: &'a DtsContext,
}

impl<'a> DrsResolver<'a> {
    pub fn new(ctx: &'a DtsContext) -> Self {
        Self { ctx }
    }

    pub fn resolve_hypercube(
        &self,
        primary: &QName,
        hypercube: &QName,
        role: &str,
    ) -> Result<ResolvedHypercube, DimensionError> {
        let not_linked = || DimensionError::NotLinked {
            primary: primary.clone(),
            hypercube: hypercube.clone(),
            role: CompactString::from(role),
        };
        let table = self.ctx.definition_role(role).ok_or_else(not_linked)?;
        let edge = self
            .has_hypercube_edges(table, primary)?
            .into_iter()
            .find(|e| &e.to == hypercube)
            .ok_or_else(not_linked)?;
        self.resolve_edge(table, primary, edge)
    }

    /// Every hypercube `primary` is linked to in `role`, own edges first,
    /// then inherited ones.
    pub fn hypercubes_for(
        &self,
        primary: &QName,
        role: &str,
    ) -> Result<Vec<ResolvedHypercube>, DimensionError> {
        let Some(table) = self.ctx.definition_role(role) else {
            return Ok(Vec::new());
        };
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for edge in self.has_hypercube_edges(table, primary)? {
            if seen.insert(edge.to.clone()) {
                out.push(self.resolve_edge(table, primary, edge)?);
            }
        }
        Ok(out)
    }

    fn resolve_edge(
        &self,
        table: &DefinitionRole,
        primary: &QName,
        edge: &DrsEdge,
    ) -> Result<ResolvedHypercube, DimensionError> {
        let key = DrsKey {
            role: table.role.clone(),
            hypercube: edge.to.clone(),
            target_role: edge.target_role.clone(),
        };
        let tree = self.ctx.drs_cache.get_or_insert_with(&key, || {
            tracing::debug!(role = %key.role, hypercube = %key.hypercube, "resolving hypercube");
            self.build_tree(table, edge).map(Arc::new)
        })?;
        Ok(ResolvedHypercube {
            primary_item: primary.clone(),
            hypercube: edge.to.clone(),
            role: table.role.clone(),
            arcrole: edge.arcrole,
            closed: edge.closed,
            context_element: edge.context_element.clone(),
            tree,
        })
    }

    /// Has-hypercube edges of `primary`, then those of its domain-member
    /// ancestors walking upwards. A directed cycle among the primary items is subject
    /// to the domain-member cycles policy.
    fn has_hypercube_edges<'t>(
        &self,
        table: &'t DefinitionRole,
        primary: &QName,
    ) -> Result<Vec<&'t DrsEdge>, DimensionError> {
        let mut edges = Vec::new();
        let mut path = vec![primary.clone()];
        self.inherit(table, primary, &mut path, &mut edges)?;
        Ok(edges)
    }

    fn inherit<'t>(
        &self,
        table: &'t DefinitionRole,
        node: &QName,
        path: &mut Vec<QName>,
        edges: &mut Vec<&'t DrsEdge>,
    ) -> Result<(), DimensionError> {
        for edge in table.has_hypercube_edges(node) {
            if !edges.iter().any(|e| std::ptr::eq(*e, edge)) {
                edges.push(edge);
            }
        }
        for parent in table.edges_to(node, DrsArcrole::DomainMember) {
            if path.contains(&parent.from) {
                self.cycle(table, parent)?;
                continue;
            }
            path.push(parent.from.clone());
            self.inherit(table, &parent.from, path, edges)?;
            path.pop();
        }
        Ok(())
    }

    /// The table that applies below `edge.to`.
    fn follow(&self, table: &DefinitionRole, edge: &DrsEdge) -> Result<Option<DefinitionRole>, DimensionError> {
        let Some(target_role) = &edge.target_role else {
            return Ok(None);
        };
        if target_role == &table.role {
            return Ok(None);
        }
        let target = self.ctx.definition_role(target_role).ok_or_else(|| {
            DimensionError::TargetRoleNotResolved {
                role: table.role.clone(),
                target_role: target_role.clone(),
                arcrole: edge.arcrole,
            }
        })?;
        Ok(Some(table.without_downstream(&edge.to).merge(target)))
    }

    fn build_tree(&self, table: &DefinitionRole, has_hypercube: &DrsEdge) -> Result<HypercubeTree, DimensionError> {
        let redirected = self.follow(table, has_hypercube)?;
        let table = redirected.as_ref().unwrap_or(table);
        let hypercube = &has_hypercube.to;

        let mut path = vec![hypercube.clone()];
        let mut dimensions = Vec::new();
        for edge in table.edges_from(hypercube, DrsArcrole::HypercubeDimension) {
            if path.contains(&edge.to) {
                self.cycle(table, edge)?;
                continue;
            }
            let redirected = self.follow(table, edge)?;
            let dim_table = redirected.as_ref().unwrap_or(table);
            path.push(edge.to.clone());
            dimensions.push(self.resolve_dimension(dim_table, &edge.to, &mut path)?);
            path.pop();
        }

        Ok(HypercubeTree {
            hypercube: hypercube.clone(),
            dimensions,
        })
    }

    fn resolve_dimension(
        &self,
        table: &DefinitionRole,
        dimension: &QName,
        path: &mut Vec<QName>,
    ) -> Result<ResolvedDimension, DimensionError> {
        let typed = matches!(self.ctx.class_of(dimension), ElementClass::Dimension { typed: true });
        let domain_edges = table.edges_from(dimension, DrsArcrole::DimensionDomain);

        // a typed dimension's domain edges are ignored; the validator reports them
        let mut domains = Vec::new();
        if !typed {
            for edge in domain_edges {
                if let Some(member) = self.walk_member(table, edge, path)? {
                    domains.push(member);
                }
            }
        }

        Ok(ResolvedDimension {
            dimension: dimension.clone(),
            typed,
            default: self.default_member(dimension),
            domains,
        })
    }

    fn walk_member(
        &self,
        table: &DefinitionRole,
        edge: &DrsEdge,
        path: &mut Vec<QName>,
    ) -> Result<Option<ResolvedMember>, DimensionError> {
        let member = &edge.to;
        let usable = edge.usable && !table.is_unusable(member);
        if path.contains(member) {
            self.cycle(table, edge)?;
            return Ok(Some(ResolvedMember {
                member: member.clone(),
                usable,
                children: Vec::new(),
            }));
        }

        let redirected = self.follow(table, edge)?;
        let child_table = redirected.as_ref().unwrap_or(table);

        path.push(member.clone());
        let mut children = Vec::new();
        for child in child_table.edges_from(member, DrsArcrole::DomainMember) {
            if let Some(resolved) = self.walk_member(child_table, child, path)? {
                children.push(resolved);
            }
        }
        path.pop();

        Ok(Some(ResolvedMember {
            member: member.clone(),
            usable,
            children,
        }))
    }

    /// A repeat on the current path. Fine under `cyclesAllowed="any"`,
    /// an error otherwise.
    fn cycle(&self, table: &DefinitionRole, edge: &DrsEdge) -> Result<(), DimensionError> {
        match self.ctx.registry().cycles_allowed(edge.arcrole.uri()) {
            CyclesAllowed::Any => {
                tracing::debug!(node = %edge.to, arcrole = %edge.arcrole, "cycle permitted, not descending");
                Ok(())
            }
            CyclesAllowed::None | CyclesAllowed::Undirected => {
                let error = DimensionError::Cycle {
                    node: edge.to.clone(),
                    arcrole: edge.arcrole,
                    role: table.role.clone(),
                };
                self.ctx.sink().report(error.to_diagnostic());
                Err(error)
            }
        }
    }

    /// Dimension defaults apply across roles. More than one leaves the
    /// dimension without a default.
    fn default_member(&self, dimension: &QName) -> Option<QName> {
        let defaults = self.default_candidates(dimension);
        if defaults.len() == 1 {
            defaults.into_iter().next()
        } else {
            None
        }
    }

    pub fn default_candidates(&self, dimension: &QName) -> BTreeSet<QName> {
        self.ctx
            .definition_roles()
            .flat_map(|role| role.edges_from(dimension, DrsArcrole::DimensionDefault))
            .map(|edge| edge.to.clone())
            .collect()
    }
}
