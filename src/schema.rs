// Schema indexing: elements, types, role/arcrole types and references
use crate::diagnostics::{Diagnostic, DiagnosticSink, ErrorKind};
use crate::fetch::resolve_location;
use crate::model::{Balance, Element, PeriodType, QName, TypeDef};
use crate::registry::{ArcroleType, CyclesAllowed, RoleType, UsedOn};
use crate::xml::XmlNode;
use crate::{ns, Error, Result};
use compact_str::CompactString;

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaImport {
    pub namespace: Option<CompactString>,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkbaseRef {
    pub location: String,
    pub role: Option<CompactString>,
}

/// Everything the loader needs from one schema document.
#[derive(Debug, Clone, Default)]
pub struct IndexedSchema {
    pub location: String,
    pub target_namespace: CompactString,
    pub prefix: Option<CompactString>,
    pub elements: Vec<Element>,
    pub types: Vec<TypeDef>,
    pub role_types: Vec<RoleType>,
    pub arcrole_types: Vec<ArcroleType>,
    pub imports: Vec<SchemaImport>,
    pub includes: Vec<String>,
    pub linkbase_refs: Vec<LinkbaseRef>,
    pub has_embedded_linkbases: bool,
}

pub struct SchemaIndexer<'a> {
    sink: &'a dyn DiagnosticSink,
}

impl<'a> SchemaIndexer<'a> {
    pub fn new(sink: &'a dyn DiagnosticSink) -> Self {
        Self { sink }
    }

    /// Indexes `root`. A schema without a target namespace that is included
    /// from another takes the including namespace (`chameleon`).
    pub fn index(&self, root: &XmlNode, location: &str, chameleon: Option<&str>) -> Result<IndexedSchema> {
        if !root.is(ns::XS, "schema") {
            return Err(Error::Parse(format!(
                "{}: root element {} is not xs:schema",
                location, root.local_name
            )));
        }

        let target_namespace = root
            .attr("targetNamespace")
            .or(chameleon)
            .unwrap_or("")
            .to_string();

        let mut schema = IndexedSchema {
            location: location.to_string(),
            prefix: root.prefix_for(&target_namespace).map(CompactString::from),
            target_namespace: CompactString::from(target_namespace.as_str()),
            ..Default::default()
        };

        for child in &root.children {
            if child.namespace.as_deref() != Some(ns::XS) {
                continue;
            }
            match child.local_name.as_str() {
                "element" => {
                    if let Some(element) = self.parse_element(child, location, &target_namespace) {
                        schema.elements.push(element);
                    }
                }
                "complexType" | "simpleType" => {
                    if let Some(name) = child.attr("name") {
                        let base = child
                            .descendants()
                            .into_iter()
                            .find(|n| n.is(ns::XS, "restriction") || n.is(ns::XS, "extension"))
                            .and_then(|n| n.attr("base").and_then(|b| n.resolve_qname(b)));
                        schema.types.push(TypeDef {
                            name: QName::new(&target_namespace, name),
                            base,
                        });
                    }
                }
                "import" => match child.attr("schemaLocation") {
                    Some(href) => schema.imports.push(SchemaImport {
                        namespace: child.attr("namespace").map(CompactString::from),
                        location: resolve_location(location, href),
                    }),
                    None => tracing::debug!(
                        namespace = ?child.attr("namespace"),
                        "import without schemaLocation in {}",
                        location
                    ),
                },
                "include" => match child.attr("schemaLocation") {
                    Some(href) => schema.includes.push(resolve_location(location, href)),
                    None => self.sink.report(
                        Diagnostic::error(
                            ErrorKind::Structural,
                            "xmlschema:includeLocation",
                            "xs:include without schemaLocation",
                        )
                        .with_field("document", location),
                    ),
                },
                "annotation" => {
                    for appinfo in child.children_named(ns::XS, "appinfo") {
                        self.parse_appinfo(appinfo, location, &mut schema);
                    }
                }
                _ => {}
            }
        }

        Ok(schema)
    }

    fn parse_element(&self, node: &XmlNode, location: &str, namespace: &str) -> Option<Element> {
        let Some(name) = node.attr("name") else {
            self.sink.report(
                Diagnostic::error(
                    ErrorKind::Structural,
                    "xmlschema:elementName",
                    "global element declaration without a name",
                )
                .with_field("document", location),
            );
            return None;
        };

        let qname_attr = |attr: &str| node.attr(attr).and_then(|v| node.resolve_qname(v));

        Some(Element {
            id: node.id().map(CompactString::from),
            name: QName::new(namespace, name),
            type_name: qname_attr("type"),
            substitution_group: qname_attr("substitutionGroup"),
            is_abstract: matches!(node.attr("abstract"), Some("true") | Some("1")),
            nillable: matches!(node.attr("nillable"), Some("true") | Some("1")),
            period_type: node.attr_ns(ns::XBRLI, "periodType").and_then(PeriodType::parse),
            balance: node.attr_ns(ns::XBRLI, "balance").and_then(Balance::parse),
            typed_domain_ref: node
                .attr_ns(ns::XBRLDT, "typedDomainRef")
                .map(|href| resolve_href(location, href)),
            document: location.to_string(),
        })
    }

    fn parse_appinfo(&self, appinfo: &XmlNode, location: &str, schema: &mut IndexedSchema) {
        for node in &appinfo.children {
            if node.is(ns::LINK, "roleType") {
                if let Some(role) = self.parse_role_type(node, location) {
                    schema.role_types.push(role);
                }
            } else if node.is(ns::LINK, "arcroleType") {
                if let Some(arcrole) = self.parse_arcrole_type(node, location) {
                    schema.arcrole_types.push(arcrole);
                }
            } else if node.is(ns::LINK, "linkbaseRef") {
                match node.xlink("href") {
                    Some(href) => schema.linkbase_refs.push(LinkbaseRef {
                        location: resolve_location(location, href.split('#').next().unwrap_or("")),
                        role: node.xlink("role").map(CompactString::from),
                    }),
                    None => self.sink.report(
                        Diagnostic::error(
                            ErrorKind::Structural,
                            "xbrl.4.3.2:linkbaseRefHref",
                            "linkbaseRef without xlink:href",
                        )
                        .with_field("document", location),
                    ),
                }
            } else if node.is(ns::LINK, "linkbase") {
                schema.has_embedded_linkbases = true;
            }
        }
    }

    fn used_on(&self, node: &XmlNode, location: &str) -> UsedOn {
        let mut used_on = UsedOn::default();
        for entry in node.children_named(ns::LINK, "usedOn") {
            match entry.resolve_qname(&entry.text) {
                Some(element) => used_on.insert(&element),
                None => self.sink.report(
                    Diagnostic::error(
                        ErrorKind::Structural,
                        "xbrl.5.1.3.4:usedOn",
                        format!("usedOn value {:?} does not resolve", entry.text),
                    )
                    .with_field("document", location),
                ),
            }
        }
        used_on
    }

    fn parse_role_type(&self, node: &XmlNode, location: &str) -> Option<RoleType> {
        let Some(uri) = node.attr("roleURI") else {
            self.sink.report(
                Diagnostic::error(ErrorKind::Structural, "xbrl.5.1.3:roleURI", "roleType without roleURI")
                    .with_field("document", location),
            );
            return None;
        };
        Some(RoleType {
            uri: CompactString::from(uri.trim()),
            id: node.id().map(CompactString::from),
            definition: definition(node),
            used_on: self.used_on(node, location),
            document: location.to_string(),
        })
    }

    fn parse_arcrole_type(&self, node: &XmlNode, location: &str) -> Option<ArcroleType> {
        let uri = node.attr("arcroleURI");
        let cycles = node.attr("cyclesAllowed").and_then(CyclesAllowed::parse);
        let (Some(uri), Some(cycles_allowed)) = (uri, cycles) else {
            self.sink.report(
                Diagnostic::error(
                    ErrorKind::Structural,
                    "xbrl.5.1.4:arcroleTypeAttributes",
                    "arcroleType without arcroleURI or a valid cyclesAllowed",
                )
                .with_field("document", location),
            );
            return None;
        };
        Some(ArcroleType {
            uri: CompactString::from(uri.trim()),
            id: node.id().map(CompactString::from),
            definition: definition(node),
            used_on: self.used_on(node, location),
            cycles_allowed,
            document: location.to_string(),
        })
    }
}

fn definition(node: &XmlNode) -> Option<String> {
    node.children_named(ns::LINK, "definition")
        .next()
        .map(|d| d.text.trim().to_string())
}

fn resolve_href(location: &str, href: &str) -> String {
    match href.split_once('#') {
        Some((doc, fragment)) => format!("{}#{}", resolve_location(location, doc), fragment),
        None => resolve_location(location, href),
    }
}
