// Structural type lookups: substitution groups, base types, element classes
use crate::model::{Element, ElementClass, QName, TypeDef};
use crate::ns;
use ahash::AHashSet;

/// Read-only view over the schema facts of a DTS.
///
/// Implementors provide the three lookups; substitution-group and
/// base-type walks are derived from them and stop on cycles.
pub trait TypeSystem {
    fn element(&self, name: &QName) -> Option<&Element>;

    fn type_def(&self, name: &QName) -> Option<&TypeDef>;

    fn namespace_for_prefix(&self, prefix: &str) -> Option<&str>;

    /// Element lookup by local name and the prefix its taxonomy declares.
    fn get_element(&self, local_name: &str, prefix: &str) -> Option<&Element> {
        let namespace = self.namespace_for_prefix(prefix)?;
        self.element(&QName::new(namespace, local_name))
    }

    /// True when `name` is one of `heads` or its substitution-group chain
    /// reaches one of them.
    fn resolve_substitution_group(&self, name: &QName, heads: &[QName]) -> bool {
        let mut seen = AHashSet::new();
        let mut current = name.clone();
        loop {
            if heads.contains(&current) {
                return true;
            }
            if !seen.insert(current.clone()) {
                return false;
            }
            match self.element(&current).and_then(|e| e.substitution_group.clone()) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// True when `type_name` is one of `bases` or derives from one of them.
    fn resolves_to_base_type(&self, type_name: &QName, bases: &[QName]) -> bool {
        let mut seen = AHashSet::new();
        let mut current = type_name.clone();
        loop {
            if bases.contains(&current) {
                return true;
            }
            if !seen.insert(current.clone()) {
                return false;
            }
            match self.type_def(&current).and_then(|t| t.base.clone()) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    fn classify(&self, name: &QName) -> ElementClass {
        let Some(element) = self.element(name) else {
            return ElementClass::Other;
        };
        let chain = |local: &str, namespace: &str| {
            self.resolve_substitution_group(name, &[QName::new(namespace, local)])
        };
        if chain("hypercubeItem", ns::XBRLDT) {
            ElementClass::Hypercube
        } else if chain("dimensionItem", ns::XBRLDT) {
            ElementClass::Dimension {
                typed: element.typed_domain_ref.is_some(),
            }
        } else if chain("item", ns::XBRLI) {
            ElementClass::Item
        } else if chain("tuple", ns::XBRLI) {
            ElementClass::Tuple
        } else {
            ElementClass::Other
        }
    }
}
