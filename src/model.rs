use crate::dimensions::DefinitionRole;
use crate::registry::{ArcroleType, RoleType};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Core taxonomy data structures
// ============================================================================

/// Namespace-qualified name, displayed in Clark notation (`{ns}local`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    pub namespace: CompactString,
    pub local_name: CompactString,
}

impl QName {
    pub fn new(namespace: &str, local_name: &str) -> Self {
        Self {
            namespace: CompactString::from(namespace),
            local_name: CompactString::from(local_name),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

/// Arena index of a taxonomy node inside the DTS context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Arena index of an extended link inside the DTS context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodType {
    Instant,
    Duration,
}

impl PeriodType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "instant" => Some(Self::Instant),
            "duration" => Some(Self::Duration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Balance {
    Debit,
    Credit,
}

impl Balance {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "debit" => Some(Self::Debit),
            "credit" => Some(Self::Credit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: Option<CompactString>,
    pub name: QName,
    pub type_name: Option<QName>,
    pub substitution_group: Option<QName>,
    pub is_abstract: bool,
    pub nillable: bool,
    pub period_type: Option<PeriodType>,
    pub balance: Option<Balance>,
    /// `xbrldt:typedDomainRef`, resolved against the declaring document.
    pub typed_domain_ref: Option<String>,
    pub document: String,
}

/// Closed classification of a concept, decided once from substitution-group
/// facts and matched exhaustively afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementClass {
    Item,
    Tuple,
    Hypercube,
    Dimension { typed: bool },
    Other,
}

impl ElementClass {
    /// Items that are neither hypercubes nor dimensions.
    pub fn is_plain_item(self) -> bool {
        matches!(self, ElementClass::Item)
    }

    pub fn is_dimension(self) -> bool {
        matches!(self, ElementClass::Dimension { .. })
    }
}

/// Named schema type and the type it derives from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: QName,
    pub base: Option<QName>,
}

/// A relationship document referenced by (or embedded in) a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkbaseRecord {
    pub location: String,
    /// `xlink:role` of the linkbaseRef, if any.
    pub role: Option<CompactString>,
    pub embedded: bool,
    pub links: Vec<LinkId>,
}

/// One node per unique target namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyNode {
    pub namespace: CompactString,
    pub location: String,
    pub prefix: Option<CompactString>,
    /// Every schema document contributing to this node (entry + includes).
    pub documents: BTreeSet<String>,
    pub imports: BTreeSet<String>,
    pub includes: BTreeSet<String>,
    pub elements: BTreeMap<CompactString, Element>,
    pub id_index: BTreeMap<CompactString, CompactString>,
    pub types: BTreeMap<CompactString, TypeDef>,
    pub role_types: Vec<RoleType>,
    pub arcrole_types: Vec<ArcroleType>,
    pub linkbases: Vec<LinkbaseRecord>,
    /// Merged from this node's own definition links during finalize.
    #[serde(skip)]
    pub definition_roles: BTreeMap<CompactString, DefinitionRole>,
}

impl TaxonomyNode {
    pub fn new(namespace: &str, location: &str) -> Self {
        let mut documents = BTreeSet::new();
        documents.insert(location.to_string());
        Self {
            namespace: CompactString::from(namespace),
            location: location.to_string(),
            documents,
            ..Default::default()
        }
    }

    #[inline]
    pub fn element(&self, local_name: &str) -> Option<&Element> {
        self.elements.get(local_name)
    }

    pub fn element_by_id(&self, id: &str) -> Option<&Element> {
        self.id_index
            .get(id)
            .and_then(|local| self.elements.get(local))
    }

    pub fn add_element(&mut self, element: Element) {
        if let Some(id) = &element.id {
            self.id_index
                .insert(id.clone(), element.name.local_name.clone());
        }
        self.elements
            .insert(element.name.local_name.clone(), element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(local: &str, id: &str) -> Element {
        Element {
            id: Some(CompactString::from(id)),
            name: QName::new("http://ex", local),
            type_name: None,
            substitution_group: None,
            is_abstract: false,
            nillable: true,
            period_type: PeriodType::parse("instant"),
            balance: Balance::parse("debit"),
            typed_domain_ref: None,
            document: "ex.xsd".to_string(),
        }
    }

    #[test]
    fn test_element_index() {
        let mut node = TaxonomyNode::new("http://ex", "ex.xsd");
        node.add_element(element("Cash", "ex_Cash"));

        assert_eq!(node.element("Cash").unwrap().id.as_deref(), Some("ex_Cash"));
        assert_eq!(
            node.element_by_id("ex_Cash").unwrap().name,
            QName::new("http://ex", "Cash")
        );
        assert!(node.element_by_id("nope").is_none());
        assert!(node.documents.contains("ex.xsd"));
    }

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::new("http://ex", "Cash").to_string(), "{http://ex}Cash");
        assert_eq!(QName::new("", "Cash").to_string(), "Cash");
    }
}
