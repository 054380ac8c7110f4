//! Role and arcrole type registry.
//!
//! Definitions from every schema in the DTS land in one registry keyed by
//! URI. A URI may be declared by several documents as long as the used-on
//! sets nest; the registry then keeps their union.

use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::model::QName;
use crate::ns;
use bitflags::bitflags;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

bitflags! {
    /// Standard elements a role or arcrole may be declared usable on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct UsedOnFlags: u32 {
        const PRESENTATION_LINK = 1 << 0;
        const CALCULATION_LINK = 1 << 1;
        const DEFINITION_LINK = 1 << 2;
        const LABEL_LINK = 1 << 3;
        const REFERENCE_LINK = 1 << 4;
        const FOOTNOTE_LINK = 1 << 5;
        const PRESENTATION_ARC = 1 << 6;
        const CALCULATION_ARC = 1 << 7;
        const DEFINITION_ARC = 1 << 8;
        const LABEL_ARC = 1 << 9;
        const REFERENCE_ARC = 1 << 10;
        const FOOTNOTE_ARC = 1 << 11;
        const LABEL = 1 << 12;
        const REFERENCE = 1 << 13;
        const FOOTNOTE = 1 << 14;
        const GENERIC_LINK = 1 << 15;
        const GENERIC_ARC = 1 << 16;
        const GENERIC_LABEL = 1 << 17;
    }
}

impl UsedOnFlags {
    pub fn from_element(element: &QName) -> Option<Self> {
        let flag = match (element.namespace.as_str(), element.local_name.as_str()) {
            (ns::LINK, "presentationLink") => Self::PRESENTATION_LINK,
            (ns::LINK, "calculationLink") => Self::CALCULATION_LINK,
            (ns::LINK, "definitionLink") => Self::DEFINITION_LINK,
            (ns::LINK, "labelLink") => Self::LABEL_LINK,
            (ns::LINK, "referenceLink") => Self::REFERENCE_LINK,
            (ns::LINK, "footnoteLink") => Self::FOOTNOTE_LINK,
            (ns::LINK, "presentationArc") => Self::PRESENTATION_ARC,
            (ns::LINK, "calculationArc") => Self::CALCULATION_ARC,
            (ns::LINK, "definitionArc") => Self::DEFINITION_ARC,
            (ns::LINK, "labelArc") => Self::LABEL_ARC,
            (ns::LINK, "referenceArc") => Self::REFERENCE_ARC,
            (ns::LINK, "footnoteArc") => Self::FOOTNOTE_ARC,
            (ns::LINK, "label") => Self::LABEL,
            (ns::LINK, "reference") => Self::REFERENCE,
            (ns::LINK, "footnote") => Self::FOOTNOTE,
            (ns::GENERIC, "link") => Self::GENERIC_LINK,
            (ns::GENERIC, "arc") => Self::GENERIC_ARC,
            (ns::GENERIC_LABEL, "label") => Self::GENERIC_LABEL,
            _ => return None,
        };
        Some(flag)
    }
}

/// Used-on set: standard elements as flags, anything else by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsedOn {
    pub flags: UsedOnFlags,
    pub custom: BTreeSet<QName>,
}

impl Default for UsedOnFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl UsedOn {
    pub fn from_elements<'a, I: IntoIterator<Item = &'a QName>>(elements: I) -> Self {
        let mut used_on = Self::default();
        for element in elements {
            used_on.insert(element);
        }
        used_on
    }

    pub fn insert(&mut self, element: &QName) {
        match UsedOnFlags::from_element(element) {
            Some(flag) => self.flags |= flag,
            None => {
                self.custom.insert(element.clone());
            }
        }
    }

    pub fn contains_element(&self, element: &QName) -> bool {
        match UsedOnFlags::from_element(element) {
            Some(flag) => self.flags.contains(flag),
            None => self.custom.contains(element),
        }
    }

    pub fn is_superset_of(&self, other: &UsedOn) -> bool {
        self.flags.contains(other.flags) && self.custom.is_superset(&other.custom)
    }

    pub fn union(&self, other: &UsedOn) -> UsedOn {
        UsedOn {
            flags: self.flags | other.flags,
            custom: self.custom.union(&other.custom).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.custom.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclesAllowed {
    None,
    Undirected,
    Any,
}

impl CyclesAllowed {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "none" => Some(Self::None),
            "undirected" => Some(Self::Undirected),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// Whether a directed cycle (a node repeated along one path) is allowed.
    pub fn permits_directed_cycles(self) -> bool {
        matches!(self, CyclesAllowed::Any)
    }
}

impl fmt::Display for CyclesAllowed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CyclesAllowed::None => "none",
            CyclesAllowed::Undirected => "undirected",
            CyclesAllowed::Any => "any",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleType {
    pub uri: CompactString,
    pub id: Option<CompactString>,
    pub definition: Option<String>,
    pub used_on: UsedOn,
    pub document: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcroleType {
    pub uri: CompactString,
    pub id: Option<CompactString>,
    pub definition: Option<String>,
    pub used_on: UsedOn,
    pub cycles_allowed: CyclesAllowed,
    pub document: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("role {uri} redeclared in {document} with a used-on set incompatible with {existing}")]
    RoleRedefinition {
        uri: CompactString,
        existing: String,
        document: String,
    },

    #[error("arcrole {uri} redeclared in {document} with a used-on set incompatible with {existing}")]
    ArcroleRedefinition {
        uri: CompactString,
        existing: String,
        document: String,
    },

    #[error("arcrole {uri} redeclared in {document} with cyclesAllowed={found}, {existing} declared {expected}")]
    CyclesConflict {
        uri: CompactString,
        existing: String,
        document: String,
        expected: CyclesAllowed,
        found: CyclesAllowed,
    },
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::RoleRedefinition { .. } => "xbrl.5.1.3:roleTypeRedefinition",
            RegistryError::ArcroleRedefinition { .. } | RegistryError::CyclesConflict { .. } => {
                "xbrl.5.1.4:arcroleTypeRedefinition"
            }
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let (uri, document) = match self {
            RegistryError::RoleRedefinition { uri, document, .. }
            | RegistryError::ArcroleRedefinition { uri, document, .. }
            | RegistryError::CyclesConflict { uri, document, .. } => (uri, document),
        };
        Diagnostic::error(ErrorKind::Conformance, self.code(), self.to_string())
            .with_field("uri", uri)
            .with_field("document", document)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: BTreeMap<CompactString, RoleType>,
    arcroles: BTreeMap<CompactString, ArcroleType>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_role(&mut self, role: RoleType) -> Result<(), RegistryError> {
        match self.roles.get_mut(&role.uri) {
            None => {
                self.roles.insert(role.uri.clone(), role);
                Ok(())
            }
            Some(existing) => {
                if !nests(&existing.used_on, &role.used_on) {
                    return Err(RegistryError::RoleRedefinition {
                        uri: role.uri,
                        existing: existing.document.clone(),
                        document: role.document,
                    });
                }
                existing.used_on = existing.used_on.union(&role.used_on);
                if existing.definition.is_none() {
                    existing.definition = role.definition;
                }
                Ok(())
            }
        }
    }

    pub fn register_arcrole(&mut self, arcrole: ArcroleType) -> Result<(), RegistryError> {
        match self.arcroles.get_mut(&arcrole.uri) {
            None => {
                self.arcroles.insert(arcrole.uri.clone(), arcrole);
                Ok(())
            }
            Some(existing) => {
                if existing.cycles_allowed != arcrole.cycles_allowed {
                    return Err(RegistryError::CyclesConflict {
                        uri: arcrole.uri,
                        existing: existing.document.clone(),
                        document: arcrole.document,
                        expected: existing.cycles_allowed,
                        found: arcrole.cycles_allowed,
                    });
                }
                if !nests(&existing.used_on, &arcrole.used_on) {
                    return Err(RegistryError::ArcroleRedefinition {
                        uri: arcrole.uri,
                        existing: existing.document.clone(),
                        document: arcrole.document,
                    });
                }
                existing.used_on = existing.used_on.union(&arcrole.used_on);
                if existing.definition.is_none() {
                    existing.definition = arcrole.definition;
                }
                Ok(())
            }
        }
    }

    pub fn lookup_role(&self, uri: &str) -> Option<&RoleType> {
        self.roles.get(uri)
    }

    pub fn lookup_arcrole(&self, uri: &str) -> Option<&ArcroleType> {
        self.arcroles.get(uri)
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleType> {
        self.roles.values()
    }

    pub fn arcroles(&self) -> impl Iterator<Item = &ArcroleType> {
        self.arcroles.values()
    }

    /// Roles declared usable on `element`.
    pub fn roles_used_on<'a>(&'a self, element: &'a QName) -> impl Iterator<Item = &'a RoleType> {
        self.roles
            .values()
            .filter(move |r| r.used_on.contains_element(element))
    }

    pub fn is_role_usable_on(&self, uri: &str, element: &QName) -> bool {
        if ns::is_standard_role(uri) {
            return true;
        }
        self.roles
            .get(uri)
            .is_some_and(|r| r.used_on.contains_element(element))
    }

    pub fn is_arcrole_usable_on(&self, uri: &str, element: &QName) -> bool {
        if let Some(arcrole) = self.arcroles.get(uri) {
            return arcrole.used_on.contains_element(element);
        }
        match builtin_arcrole(uri) {
            Some((flag, _)) => UsedOnFlags::from_element(element).is_some_and(|f| flag.contains(f)),
            None => false,
        }
    }

    /// Cycles policy of `uri`; a registered declaration overrides the
    /// built-in XBRL 2.1 / XDT policy. Unknown arcroles allow no cycles.
    pub fn cycles_allowed(&self, uri: &str) -> CyclesAllowed {
        self.arcroles
            .get(uri)
            .map(|a| a.cycles_allowed)
            .or_else(|| builtin_arcrole(uri).map(|(_, cycles)| cycles))
            .unwrap_or(CyclesAllowed::None)
    }
}

fn nests(a: &UsedOn, b: &UsedOn) -> bool {
    a.is_superset_of(b) || b.is_superset_of(a)
}

fn builtin_arcrole(uri: &str) -> Option<(UsedOnFlags, CyclesAllowed)> {
    let entry = match uri {
        ns::PARENT_CHILD => (UsedOnFlags::PRESENTATION_ARC, CyclesAllowed::Undirected),
        ns::SUMMATION_ITEM => (UsedOnFlags::CALCULATION_ARC, CyclesAllowed::Any),
        ns::GENERAL_SPECIAL => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::Undirected),
        ns::ESSENCE_ALIAS => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::Undirected),
        ns::SIMILAR_TUPLES => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::Any),
        ns::REQUIRES_ELEMENT => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::Any),
        ns::CONCEPT_LABEL => (UsedOnFlags::LABEL_ARC, CyclesAllowed::None),
        ns::CONCEPT_REFERENCE => (UsedOnFlags::REFERENCE_ARC, CyclesAllowed::None),
        ns::FACT_FOOTNOTE => (UsedOnFlags::FOOTNOTE_ARC, CyclesAllowed::None),
        ns::ELEMENT_LABEL => (UsedOnFlags::GENERIC_ARC, CyclesAllowed::None),
        ns::ALL | ns::NOT_ALL => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::Undirected),
        ns::HYPERCUBE_DIMENSION => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::None),
        ns::DIMENSION_DOMAIN => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::None),
        ns::DOMAIN_MEMBER => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::Undirected),
        ns::DIMENSION_DEFAULT => (UsedOnFlags::DEFINITION_ARC, CyclesAllowed::None),
        _ => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(local: &str) -> QName {
        QName::new(ns::LINK, local)
    }

    fn role(uri: &str, used_on: &[&str], document: &str) -> RoleType {
        let elements: Vec<QName> = used_on.iter().map(|l| link(l)).collect();
        RoleType {
            uri: CompactString::from(uri),
            id: None,
            definition: None,
            used_on: UsedOn::from_elements(&elements),
            document: document.to_string(),
        }
    }

    #[test]
    fn test_role_redeclaration_with_superset_merges() {
        let mut registry = RoleRegistry::new();
        registry
            .register_role(role("http://ex/role/R", &["presentationLink"], "doc1.xsd"))
            .unwrap();
        registry
            .register_role(role(
                "http://ex/role/R",
                &["presentationLink", "labelLink"],
                "doc2.xsd",
            ))
            .unwrap();

        assert_eq!(registry.roles().count(), 1);
        assert!(registry.is_role_usable_on("http://ex/role/R", &link("presentationLink")));
        assert!(registry.is_role_usable_on("http://ex/role/R", &link("labelLink")));
        assert!(!registry.is_role_usable_on("http://ex/role/R", &link("definitionLink")));
    }

    #[test]
    fn test_role_redeclaration_with_disjoint_set_conflicts() {
        let mut registry = RoleRegistry::new();
        registry
            .register_role(role("http://ex/role/R", &["presentationLink"], "doc1.xsd"))
            .unwrap();
        let err = registry
            .register_role(role("http://ex/role/R", &["definitionLink"], "doc2.xsd"))
            .unwrap_err();

        assert!(matches!(err, RegistryError::RoleRedefinition { .. }));
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.kind, ErrorKind::Conformance);
        assert_eq!(diagnostic.field("document"), Some("doc2.xsd"));
        // the original declaration is untouched
        assert!(!registry.is_role_usable_on("http://ex/role/R", &link("definitionLink")));
    }

    #[test]
    fn test_arcrole_cycles_policy() {
        let mut registry = RoleRegistry::new();
        assert_eq!(registry.cycles_allowed(ns::HYPERCUBE_DIMENSION), CyclesAllowed::None);
        assert_eq!(registry.cycles_allowed(ns::SUMMATION_ITEM), CyclesAllowed::Any);
        assert_eq!(registry.cycles_allowed("http://ex/unknown"), CyclesAllowed::None);

        let arcrole = ArcroleType {
            uri: CompactString::from("http://ex/arcrole/link"),
            id: None,
            definition: Some("custom".to_string()),
            used_on: UsedOn::from_elements(&[link("definitionArc")]),
            cycles_allowed: CyclesAllowed::Any,
            document: "a.xsd".to_string(),
        };
        registry.register_arcrole(arcrole.clone()).unwrap();
        assert_eq!(registry.cycles_allowed("http://ex/arcrole/link"), CyclesAllowed::Any);
        assert!(registry.is_arcrole_usable_on("http://ex/arcrole/link", &link("definitionArc")));
        assert!(!registry.is_arcrole_usable_on("http://ex/arcrole/link", &link("labelArc")));

        let conflicting = ArcroleType {
            cycles_allowed: CyclesAllowed::None,
            document: "b.xsd".to_string(),
            ..arcrole
        };
        assert!(matches!(
            registry.register_arcrole(conflicting),
            Err(RegistryError::CyclesConflict { .. })
        ));
    }

    #[test]
    fn test_builtin_arcroles_are_bound_to_their_arcs() {
        let registry = RoleRegistry::new();
        assert!(registry.is_arcrole_usable_on(ns::PARENT_CHILD, &link("presentationArc")));
        assert!(!registry.is_arcrole_usable_on(ns::PARENT_CHILD, &link("calculationArc")));
        assert!(registry.is_arcrole_usable_on(ns::ALL, &link("definitionArc")));
        assert!(registry.is_role_usable_on(ns::STANDARD_LINK_ROLE, &link("labelLink")));
    }
}
