// Extended link processing: locators, resources, arcs and the override rule
use crate::diagnostics::{Diagnostic, DiagnosticSink, ErrorKind};
use crate::fetch::{resolve_location, split_href};
use crate::model::QName;
use crate::registry::RoleRegistry;
use crate::xml::XmlNode;
use crate::ns;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkKind {
    Presentation,
    Calculation,
    Definition,
    Label,
    Reference,
    Footnote,
    Generic,
    Custom(QName),
}

impl LinkKind {
    pub fn from_element(element: &QName) -> Self {
        match (element.namespace.as_str(), element.local_name.as_str()) {
            (ns::LINK, "presentationLink") => LinkKind::Presentation,
            (ns::LINK, "calculationLink") => LinkKind::Calculation,
            (ns::LINK, "definitionLink") => LinkKind::Definition,
            (ns::LINK, "labelLink") => LinkKind::Label,
            (ns::LINK, "referenceLink") => LinkKind::Reference,
            (ns::LINK, "footnoteLink") => LinkKind::Footnote,
            (ns::GENERIC, "link") => LinkKind::Generic,
            _ => LinkKind::Custom(element.clone()),
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Presentation => f.write_str("presentation"),
            LinkKind::Calculation => f.write_str("calculation"),
            LinkKind::Definition => f.write_str("definition"),
            LinkKind::Label => f.write_str("label"),
            LinkKind::Reference => f.write_str("reference"),
            LinkKind::Footnote => f.write_str("footnote"),
            LinkKind::Generic => f.write_str("generic"),
            LinkKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Document + fragment target of a locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Href {
    pub document: String,
    pub fragment: Option<CompactString>,
}

impl Href {
    /// Resolves `href` relative to the document containing it. Only bare
    /// ids and `element(id)` pointers are understood.
    pub fn parse(base: &str, href: &str) -> Self {
        let (doc, fragment) = split_href(href.trim());
        let fragment = fragment.map(|f| {
            let id = f
                .strip_prefix("element(")
                .and_then(|rest| rest.strip_suffix(')'))
                .unwrap_or(f);
            CompactString::from(id)
        });
        Self {
            document: resolve_location(base, doc),
            fragment,
        }
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}#{}", self.document, fragment),
            None => f.write_str(&self.document),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub label: CompactString,
    pub element: QName,
    pub role: Option<CompactString>,
    pub lang: Option<CompactString>,
    pub id: Option<CompactString>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArcUse {
    Optional,
    Prohibited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub element: QName,
    pub arcrole: CompactString,
    pub from: CompactString,
    pub to: CompactString,
    pub priority: i32,
    pub usage: ArcUse,
    pub order: f64,
    pub weight: Option<f64>,
    pub preferred_label: Option<CompactString>,
    pub target_role: Option<CompactString>,
    pub closed: Option<bool>,
    pub context_element: Option<CompactString>,
    pub usable: Option<bool>,
    /// Non-exempt attributes in canonical form, keyed in Clark notation.
    /// Attributes equal to their default are left out.
    pub attributes: BTreeMap<CompactString, String>,
}

impl Arc {
    #[inline]
    pub fn is_prohibited(&self) -> bool {
        self.usage == ArcUse::Prohibited
    }
}

/// Arc/relationship selection under the priority and prohibition rule.
pub trait Overridable {
    fn priority(&self) -> i32;
    fn is_prohibited(&self) -> bool;
}

impl Overridable for Arc {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_prohibited(&self) -> bool {
        self.usage == ArcUse::Prohibited
    }
}

impl<T: Overridable> Overridable for &T {
    fn priority(&self) -> i32 {
        (**self).priority()
    }

    fn is_prohibited(&self) -> bool {
        (**self).is_prohibited()
    }
}

/// Effective members of one equivalence group: the highest priority wins,
/// a prohibited arc at that priority suppresses the whole group, otherwise
/// every arc at that priority survives. Independent of input order.
pub fn select_effective<T: Overridable>(group: &[T]) -> Vec<&T> {
    let Some(max) = group.iter().map(|a| a.priority()).max() else {
        return Vec::new();
    };
    let top: Vec<&T> = group.iter().filter(|a| a.priority() == max).collect();
    if top.iter().any(|a| a.is_prohibited()) {
        Vec::new()
    } else {
        top
    }
}

/// Identity of an arc endpoint for equivalence purposes: concepts by name,
/// resources by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointKey {
    Concept(QName),
    Resource {
        element: QName,
        role: Option<CompactString>,
        lang: Option<CompactString>,
        text: String,
    },
}

impl EndpointKey {
    pub fn for_resource(resource: &Resource) -> Self {
        EndpointKey::Resource {
            element: resource.element.clone(),
            role: resource.role.clone(),
            lang: resource.lang.as_ref().map(|l| CompactString::from(l.to_lowercase())),
            text: resource.text.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EquivalenceKey {
    pub element: QName,
    pub arcrole: CompactString,
    pub from: EndpointKey,
    pub to: EndpointKey,
    pub attributes: Vec<(CompactString, String)>,
}

impl EquivalenceKey {
    pub fn new(arc: &Arc, from: EndpointKey, to: EndpointKey) -> Self {
        Self {
            element: arc.element.clone(),
            arcrole: arc.arcrole.clone(),
            from,
            to,
            attributes: arc
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedLink {
    pub kind: LinkKind,
    pub element: QName,
    pub role: CompactString,
    pub document: String,
    pub locators: BTreeMap<CompactString, Vec<Href>>,
    pub resources: BTreeMap<CompactString, Vec<Resource>>,
    /// from-label -> to-label -> arcs in document order
    pub arcs: BTreeMap<CompactString, BTreeMap<CompactString, Vec<Arc>>>,
}

impl ExtendedLink {
    pub fn new(kind: LinkKind, element: QName, role: &str, document: &str) -> Self {
        Self {
            kind,
            element,
            role: CompactString::from(role),
            document: document.to_string(),
            locators: BTreeMap::new(),
            resources: BTreeMap::new(),
            arcs: BTreeMap::new(),
        }
    }

    pub fn arcs(&self) -> impl Iterator<Item = &Arc> {
        self.arcs.values().flat_map(|to| to.values()).flatten()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs().count()
    }

    fn has_label(&self, label: &str) -> bool {
        self.locators.contains_key(label) || self.resources.contains_key(label)
    }
}

/// Parses the extended links of one relationship document.
pub struct ExtendedLinkResolver<'a> {
    registry: &'a RoleRegistry,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> ExtendedLinkResolver<'a> {
    pub fn new(registry: &'a RoleRegistry, sink: &'a dyn DiagnosticSink) -> Self {
        Self { registry, sink }
    }

    /// Extended links of `document` whose role is `link_role`.
    pub fn resolve(&self, document: &XmlNode, location: &str, link_role: &str) -> Vec<ExtendedLink> {
        self.resolve_all(document, location)
            .into_iter()
            .filter(|link| link.role == link_role)
            .collect()
    }

    /// Every extended link in `document`, which is either a linkbase or an
    /// element containing one.
    pub fn resolve_all(&self, document: &XmlNode, location: &str) -> Vec<ExtendedLink> {
        let mut links = Vec::new();
        for node in document.descendants() {
            if node.is(ns::LINK, "linkbase") {
                for child in &node.children {
                    if child.xlink("type") == Some("extended") {
                        if let Some(link) = self.parse_link(child, location) {
                            links.push(link);
                        }
                    }
                }
            }
        }
        links
    }

    fn parse_link(&self, node: &XmlNode, location: &str) -> Option<ExtendedLink> {
        let element = element_name(node);
        let Some(role) = node.xlink("role") else {
            self.sink.report(
                Diagnostic::error(
                    ErrorKind::Structural,
                    "xbrl.3.5.3:missingLinkRole",
                    format!("extended link {} has no xlink:role", element),
                )
                .with_field("document", location),
            );
            return None;
        };

        if !self.registry.is_role_usable_on(role, &element) {
            self.sink.report(
                Diagnostic::error(
                    ErrorKind::Conformance,
                    "xbrl.5.1.3:roleNotUsable",
                    format!("role {} is not declared usable on {}", role, element),
                )
                .with_field("document", location)
                .with_field("role", role),
            );
            return None;
        }

        let mut link = ExtendedLink::new(LinkKind::from_element(&element), element, role, location);
        let mut pending_arcs = Vec::new();

        for child in &node.children {
            match child.xlink("type") {
                Some("locator") => self.parse_locator(child, location, &mut link),
                Some("resource") => self.parse_resource(child, location, &mut link),
                Some("arc") => pending_arcs.push(child),
                _ => {}
            }
        }

        // labels may be declared after the arcs that use them
        for arc_node in pending_arcs {
            if let Some(arc) = self.parse_arc(arc_node, location, &link) {
                let to_arcs = link
                    .arcs
                    .entry(arc.from.clone())
                    .or_default()
                    .entry(arc.to.clone())
                    .or_default();
                if to_arcs
                    .iter()
                    .any(|a| a.arcrole == arc.arcrole && a.priority == arc.priority)
                {
                    self.sink.report(
                        Diagnostic::error(
                            ErrorKind::Conformance,
                            "xbrl.3.5.3.9:duplicateArc",
                            format!(
                                "arcs {} -> {} ({}) duplicated at priority {}",
                                arc.from, arc.to, arc.arcrole, arc.priority
                            ),
                        )
                        .with_field("document", location)
                        .with_field("role", &link.role),
                    );
                }
                to_arcs.push(arc);
            }
        }

        Some(link)
    }

    fn parse_locator(&self, node: &XmlNode, location: &str, link: &mut ExtendedLink) {
        match (node.xlink("label"), node.xlink("href")) {
            (Some(label), Some(href)) => link
                .locators
                .entry(CompactString::from(label))
                .or_default()
                .push(Href::parse(location, href)),
            _ => self.sink.report(
                Diagnostic::error(
                    ErrorKind::Structural,
                    "xbrl.3.5.3.7:locatorAttributes",
                    "locator without xlink:label or xlink:href",
                )
                .with_field("document", location),
            ),
        }
    }

    fn parse_resource(&self, node: &XmlNode, location: &str, link: &mut ExtendedLink) {
        let Some(label) = node.xlink("label") else {
            self.sink.report(
                Diagnostic::error(
                    ErrorKind::Structural,
                    "xbrl.3.5.3.8:resourceLabel",
                    "resource without xlink:label",
                )
                .with_field("document", location),
            );
            return;
        };
        let resource = Resource {
            label: CompactString::from(label),
            element: element_name(node),
            role: node.xlink("role").map(CompactString::from),
            lang: node.attr_ns(ns::XML, "lang").map(CompactString::from),
            id: node.id().map(CompactString::from),
            text: node.text.trim().to_string(),
        };
        link.resources
            .entry(resource.label.clone())
            .or_default()
            .push(resource);
    }

    fn parse_arc(&self, node: &XmlNode, location: &str, link: &ExtendedLink) -> Option<Arc> {
        let element = element_name(node);
        let (Some(from), Some(to), Some(arcrole)) =
            (node.xlink("from"), node.xlink("to"), node.xlink("arcrole"))
        else {
            self.sink.report(
                Diagnostic::error(
                    ErrorKind::Structural,
                    "xbrl.3.5.3.9:arcAttributes",
                    format!("{} without xlink:from, xlink:to or xlink:arcrole", element),
                )
                .with_field("document", location),
            );
            return None;
        };

        if !self.registry.is_arcrole_usable_on(arcrole, &element) {
            self.sink.report(
                Diagnostic::error(
                    ErrorKind::Conformance,
                    "xbrl.5.1.4:arcroleNotUsable",
                    format!("arcrole {} is not declared usable on {}", arcrole, element),
                )
                .with_field("document", location)
                .with_field("arcrole", arcrole),
            );
            return None;
        }

        for label in [from, to] {
            if !link.has_label(label) {
                self.sink.report(
                    Diagnostic::error(
                        ErrorKind::Reference,
                        "xlink:arcLabelNotFound",
                        format!("arc endpoint label {} is not defined in the link", label),
                    )
                    .with_field("document", location)
                    .with_field("role", &link.role),
                );
                return None;
            }
        }

        let priority = match node.attr("priority") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                self.sink.report(
                    Diagnostic::warning(
                        ErrorKind::Structural,
                        "xbrl.3.5.3.9:priority",
                        format!("invalid priority {:?}, using 0", raw),
                    )
                    .with_field("document", location),
                );
                0
            }),
            None => 0,
        };
        let usage = match node.attr("use").map(str::trim) {
            Some("prohibited") => ArcUse::Prohibited,
            _ => ArcUse::Optional,
        };
        let order = node
            .attr("order")
            .and_then(|o| o.trim().parse::<f64>().ok())
            .unwrap_or(1.0);
        let weight = node.attr("weight").and_then(|w| w.trim().parse::<f64>().ok());
        let is_calculation = element.namespace == ns::LINK && element.local_name == "calculationArc";

        let mut attributes = BTreeMap::new();
        for attr in &node.attributes {
            let namespace = attr.namespace.as_deref();
            if namespace == Some(ns::XLINK) {
                continue;
            }
            let canonical = match (namespace, attr.local_name.as_str()) {
                (None, "use") | (None, "priority") => continue,
                (None, "order") if is_calculation => continue,
                (None, "order") => non_default_number(order, 1.0),
                (None, "weight") => weight.map(canonical_number),
                (Some(ns::XBRLDT), "closed") => non_default_bool(&attr.value, false),
                (Some(ns::XBRLDT), "usable") => non_default_bool(&attr.value, true),
                _ => Some(attr.value.trim().to_string()),
            };
            if let Some(value) = canonical {
                attributes.insert(clark(namespace, &attr.local_name), value);
            }
        }

        Some(Arc {
            element,
            arcrole: CompactString::from(arcrole),
            from: CompactString::from(from),
            to: CompactString::from(to),
            priority,
            usage,
            order,
            weight,
            preferred_label: node.attr("preferredLabel").map(CompactString::from),
            target_role: node.attr_ns(ns::XBRLDT, "targetRole").map(CompactString::from),
            closed: node.attr_ns(ns::XBRLDT, "closed").map(parse_bool),
            context_element: node
                .attr_ns(ns::XBRLDT, "contextElement")
                .map(|c| CompactString::from(c.trim())),
            usable: node.attr_ns(ns::XBRLDT, "usable").map(parse_bool),
            attributes,
        })
    }
}

pub(crate) fn element_name(node: &XmlNode) -> QName {
    QName::new(node.namespace.as_deref().unwrap_or(""), &node.local_name)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "true" | "1")
}

fn canonical_number(value: f64) -> String {
    format!("{}", value)
}

fn non_default_number(value: f64, default: f64) -> Option<String> {
    (value != default).then(|| canonical_number(value))
}

fn non_default_bool(raw: &str, default: bool) -> Option<String> {
    let value = parse_bool(raw);
    (value != default).then(|| value.to_string())
}

fn clark(namespace: Option<&str>, local: &str) -> CompactString {
    match namespace {
        Some(ns) => CompactString::from(format!("{{{}}}{}", ns, local)),
        None => CompactString::from(local),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::xml::{DocumentParser, QuickXmlParser};

    const PRESENTATION: &str = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
        xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:presentationLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Assets" xlink:label="assets"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#element(ex_Cash)" xlink:label="cash"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
        xlink:from="assets" xlink:to="cash" order="2.0"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
        xlink:from="assets" xlink:to="cash" order="2" priority="1" use="prohibited"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
        xlink:from="assets" xlink:to="cash"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child"
        xlink:from="assets" xlink:to="missing"/>
  </link:presentationLink>
  <link:presentationLink xlink:type="extended" xlink:role="http://ex/role/undeclared"/>
</link:linkbase>"#;

    fn parse(text: &str, sink: &CollectingSink) -> Vec<ExtendedLink> {
        let registry = RoleRegistry::new();
        let root = QuickXmlParser.parse("dir/pre.xml", text.as_bytes()).unwrap();
        ExtendedLinkResolver::new(&registry, sink).resolve_all(&root, "dir/pre.xml")
    }

    #[test]
    fn test_parse_presentation_link() {
        let sink = CollectingSink::new();
        let links = parse(PRESENTATION, &sink);

        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.kind, LinkKind::Presentation);
        assert_eq!(link.role, ns::STANDARD_LINK_ROLE);
        assert_eq!(
            link.locators["cash"][0],
            Href {
                document: "dir/ex.xsd".to_string(),
                fragment: Some(CompactString::from("ex_Cash")),
            }
        );
        // summation-item on a presentation arc and the dangling label are dropped
        assert_eq!(link.arc_count(), 2);
        assert!(sink.has_code("xbrl.5.1.4:arcroleNotUsable"));
        assert!(sink.has_code("xlink:arcLabelNotFound"));
        assert!(sink.has_code("xbrl.5.1.3:roleNotUsable"));
        assert!(!sink.has_code("xbrl.3.5.3.9:duplicateArc"));
    }

    #[test]
    fn test_order_is_normalized_in_attributes() {
        let sink = CollectingSink::new();
        let links = parse(PRESENTATION, &sink);
        let arcs: Vec<&Arc> = links[0].arcs().collect();

        assert_eq!(arcs[0].attributes.get("order").map(String::as_str), Some("2"));
        assert_eq!(arcs[0].attributes, arcs[1].attributes);
        let from = EndpointKey::Concept(QName::new("http://ex", "Assets"));
        let to = EndpointKey::Concept(QName::new("http://ex", "Cash"));
        assert_eq!(
            EquivalenceKey::new(arcs[0], from.clone(), to.clone()),
            EquivalenceKey::new(arcs[1], from, to)
        );
    }

    #[test]
    fn test_select_effective_rule() {
        let sink = CollectingSink::new();
        let links = parse(PRESENTATION, &sink);
        let arcs: Vec<&Arc> = links[0].arcs().collect();

        // prohibited at the highest priority suppresses the group
        assert!(select_effective(&arcs).is_empty());

        let mut normal = arcs[1].clone();
        normal.usage = ArcUse::Optional;
        let group = vec![arcs[0].clone(), normal.clone(), normal];
        let effective = select_effective(&group);
        assert_eq!(effective.len(), 2);
        assert!(effective.iter().all(|a| a.priority == 1));

        let reversed: Vec<Arc> = group.iter().rev().cloned().collect();
        assert_eq!(select_effective(&reversed).len(), 2);
        assert!(select_effective::<Arc>(&[]).is_empty());
    }

    #[test]
    fn test_calculation_order_is_exempt_and_duplicates_reported() {
        let text = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
            xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:calculationLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#a" xlink:label="a"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#b" xlink:label="b"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
        xlink:from="a" xlink:to="b" order="1" weight="1.0"/>
    <link:calculationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/summation-item"
        xlink:from="a" xlink:to="b" order="5" weight="1"/>
  </link:calculationLink>
</link:linkbase>"#;
        let sink = CollectingSink::new();
        let links = parse(text, &sink);
        let arcs: Vec<&Arc> = links[0].arcs().collect();

        assert_eq!(arcs.len(), 2);
        assert_eq!(arcs[0].attributes, arcs[1].attributes);
        assert_eq!(arcs[1].weight, Some(1.0));
        assert!(sink.has_code("xbrl.3.5.3.9:duplicateArc"));
    }

    #[test]
    fn test_label_resources() {
        let text = r#"<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase"
            xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Cash" xlink:label="cash"/>
    <link:label xlink:type="resource" xlink:label="cash_lbl" xml:lang="en"
        xlink:role="http://www.xbrl.org/2003/role/terseLabel">Cash</link:label>
    <link:labelArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/concept-label"
        xlink:from="cash" xlink:to="cash_lbl"/>
  </link:labelLink>
</link:linkbase>"#;
        let sink = CollectingSink::new();
        let links = parse(text, &sink);
        let resource = &links[0].resources["cash_lbl"][0];

        assert_eq!(links[0].kind, LinkKind::Label);
        assert_eq!(resource.text, "Cash");
        assert_eq!(resource.lang.as_deref(), Some("en"));
        assert_eq!(resource.role.as_deref(), Some(ns::TERSE_LABEL_ROLE));
        assert_eq!(links[0].arc_count(), 1);
        assert!(sink.diagnostics().is_empty());
    }
}
