//! Generic labeled-tree view of markup documents.
//!
//! Every component above this module sees documents only as [`XmlNode`]
//! trees: namespace-resolved element names, attributes, children and text.
//! The concrete markup parser is injected through [`DocumentParser`];
//! [`QuickXmlParser`] is the default implementation.

use crate::model::QName;
use crate::{ns, Error, Result};
use compact_str::CompactString;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::sync::Arc;

/// In-scope namespace bindings, shared between nodes that declare nothing new.
#[derive(Debug, Default)]
pub struct NamespaceScope {
    parent: Option<Arc<NamespaceScope>>,
    bindings: Vec<(CompactString, CompactString)>,
}

impl NamespaceScope {
    /// Namespace bound to `prefix` ("" for the default namespace).
    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some((_, uri)) = current.bindings.iter().rev().find(|(p, _)| *p == prefix) {
                // xmlns="" undeclares the default namespace
                return if uri.is_empty() { None } else { Some(uri.as_str()) };
            }
            scope = current.parent.as_deref();
        }
        match prefix {
            "xml" => Some(ns::XML),
            _ => None,
        }
    }

    /// First non-default prefix bound to `uri`.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some((prefix, _)) = current
                .bindings
                .iter()
                .find(|(p, u)| *u == uri && !p.is_empty())
            {
                return Some(prefix.as_str());
            }
            scope = current.parent.as_deref();
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub namespace: Option<CompactString>,
    pub local_name: CompactString,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct XmlNode {
    pub namespace: Option<CompactString>,
    pub local_name: CompactString,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
    pub text: String,
    scope: Arc<NamespaceScope>,
}

impl XmlNode {
    #[inline]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Unqualified attribute.
    pub fn attr(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    pub fn attr_ns(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local_name == local_name)
            .map(|a| a.value.as_str())
    }

    #[inline]
    pub fn xlink(&self, local_name: &str) -> Option<&str> {
        self.attr_ns(ns::XLINK, local_name)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    /// Resolves a QName-valued attribute or text (`prefix:local`) against the
    /// bindings in scope at this node. Unprefixed values take the default
    /// namespace.
    pub fn resolve_qname(&self, value: &str) -> Option<QName> {
        let value = value.trim();
        let (prefix, local) = split_qname(value);
        match self.scope.lookup(prefix.unwrap_or("")) {
            Some(uri) => Some(QName::new(uri, local)),
            None if prefix.is_none() => Some(QName::new("", local)),
            None => None,
        }
    }

    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.scope.prefix_for(uri)
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children
            .iter()
            .filter(move |c| c.is(namespace, local_name))
    }

    /// Depth-first, document-order traversal including `self`.
    pub fn descendants(&self) -> Vec<&XmlNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn find_by_id(&self, id: &str) -> Option<&XmlNode> {
        self.descendants().into_iter().find(|n| n.id() == Some(id))
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Injected markup parser producing the generic tree view.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, location: &str, data: &[u8]) -> Result<XmlNode>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QuickXmlParser;

impl DocumentParser for QuickXmlParser {
    fn parse(&self, location: &str, data: &[u8]) -> Result<XmlNode> {
        // Skip BOM if present
        let data = if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
            &data[3..]
        } else {
            data
        };

        let text = std::str::from_utf8(data)
            .map_err(|_| Error::Parse(format!("Invalid UTF-8 in {}", location)))?;

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let scope = stack.last().map(|n| n.scope.clone()).unwrap_or_default();
                    stack.push(open_element(&e, scope, location)?);
                }
                Ok(Event::Empty(e)) => {
                    let scope = stack.last().map(|n| n.scope.clone()).unwrap_or_default();
                    let node = open_element(&e, scope, location)?;
                    attach(&mut stack, &mut root, node);
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().ok_or_else(|| {
                        Error::Parse(format!("{}: unbalanced end tag", location))
                    })?;
                    attach(&mut stack, &mut root, node);
                }
                Ok(Event::Text(t)) => {
                    if let Some(node) = stack.last_mut() {
                        let content = t
                            .unescape()
                            .map_err(|e| Error::Parse(format!("{}: {}", location, e)))?;
                        node.text.push_str(&content);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::Parse(format!(
                        "{} at position {}: {}",
                        location,
                        reader.buffer_position(),
                        e
                    )))
                }
            }
        }

        if !stack.is_empty() {
            return Err(Error::Parse(format!("{}: unclosed elements", location)));
        }

        root.ok_or_else(|| Error::Parse(format!("{}: no root element", location)))
    }
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_none() {
        *root = Some(node);
    }
}

fn open_element(e: &BytesStart, parent: Arc<NamespaceScope>, location: &str) -> Result<XmlNode> {
    let mut bindings = Vec::new();
    let mut raw = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::Parse(format!("{}: {}", location, err)))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| Error::Parse(format!("Invalid UTF-8 in attribute name in {}", location)))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| Error::Parse(format!("{}: {}", location, err)))?
            .into_owned();

        if key == "xmlns" {
            bindings.push((CompactString::new(""), CompactString::from(value)));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            bindings.push((CompactString::from(prefix), CompactString::from(value)));
        } else {
            raw.push((key, value));
        }
    }

    let scope = if bindings.is_empty() {
        parent
    } else {
        Arc::new(NamespaceScope {
            parent: Some(parent),
            bindings,
        })
    };

    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|_| Error::Parse(format!("Invalid UTF-8 in tag name in {}", location)))?
        .to_string();
    let (prefix, local) = split_qname(&name);
    let namespace = scope.lookup(prefix.unwrap_or("")).map(CompactString::from);
    if prefix.is_some() && namespace.is_none() {
        return Err(Error::Parse(format!(
            "{}: unbound prefix on element {}",
            location, name
        )));
    }

    let attributes = raw
        .into_iter()
        .map(|(key, value)| {
            let (prefix, local) = split_qname(&key);
            XmlAttribute {
                namespace: prefix.and_then(|p| scope.lookup(p)).map(CompactString::from),
                local_name: CompactString::from(local),
                value,
            }
        })
        .collect();

    Ok(XmlNode {
        namespace,
        local_name: CompactString::from(local),
        attributes,
        children: Vec::new(),
        text: String::new(),
        scope,
    })
}
