// Standard namespaces, roles and arcroles used throughout DTS resolution

pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XLINK: &str = "http://www.w3.org/1999/xlink";
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
pub const LINK: &str = "http://www.xbrl.org/2003/linkbase";
pub const XBRLI: &str = "http://www.xbrl.org/2003/instance";
pub const XBRLDT: &str = "http://xbrl.org/2005/xbrldt";
pub const GENERIC: &str = "http://xbrl.org/2008/generic";
pub const GENERIC_LABEL: &str = "http://xbrl.org/2008/label";

// Link roles
pub const STANDARD_LINK_ROLE: &str = "http://www.xbrl.org/2003/role/link";
pub const STANDARD_ROLE_PREFIX: &str = "http://www.xbrl.org/2003/role/";

// Label resource roles
pub const LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/label";
pub const TERSE_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/terseLabel";
pub const VERBOSE_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/verboseLabel";
pub const TOTAL_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/totalLabel";
pub const DOCUMENTATION_ROLE: &str = "http://www.xbrl.org/2003/role/documentation";

// XBRL 2.1 arcroles
pub const PARENT_CHILD: &str = "http://www.xbrl.org/2003/arcrole/parent-child";
pub const SUMMATION_ITEM: &str = "http://www.xbrl.org/2003/arcrole/summation-item";
pub const GENERAL_SPECIAL: &str = "http://www.xbrl.org/2003/arcrole/general-special";
pub const ESSENCE_ALIAS: &str = "http://www.xbrl.org/2003/arcrole/essence-alias";
pub const SIMILAR_TUPLES: &str = "http://www.xbrl.org/2003/arcrole/similar-tuples";
pub const REQUIRES_ELEMENT: &str = "http://www.xbrl.org/2003/arcrole/requires-element";
pub const CONCEPT_LABEL: &str = "http://www.xbrl.org/2003/arcrole/concept-label";
pub const CONCEPT_REFERENCE: &str = "http://www.xbrl.org/2003/arcrole/concept-reference";
pub const FACT_FOOTNOTE: &str = "http://www.xbrl.org/2003/arcrole/fact-footnote";
pub const ELEMENT_LABEL: &str = "http://xbrl.org/arcrole/2008/element-label";

// XBRL Dimensions arcroles
pub const ALL: &str = "http://xbrl.org/int/dim/arcrole/all";
pub const NOT_ALL: &str = "http://xbrl.org/int/dim/arcrole/notAll";
pub const HYPERCUBE_DIMENSION: &str = "http://xbrl.org/int/dim/arcrole/hypercube-dimension";
pub const DIMENSION_DOMAIN: &str = "http://xbrl.org/int/dim/arcrole/dimension-domain";
pub const DOMAIN_MEMBER: &str = "http://xbrl.org/int/dim/arcrole/domain-member";
pub const DIMENSION_DEFAULT: &str = "http://xbrl.org/int/dim/arcrole/dimension-default";

// Linkbase reference roles
pub const PRESENTATION_LINKBASE_REF: &str =
    "http://www.xbrl.org/2003/role/presentationLinkbaseRef";
pub const CALCULATION_LINKBASE_REF: &str =
    "http://www.xbrl.org/2003/role/calculationLinkbaseRef";
pub const DEFINITION_LINKBASE_REF: &str = "http://www.xbrl.org/2003/role/definitionLinkbaseRef";
pub const LABEL_LINKBASE_REF: &str = "http://www.xbrl.org/2003/role/labelLinkbaseRef";
pub const REFERENCE_LINKBASE_REF: &str = "http://www.xbrl.org/2003/role/referenceLinkbaseRef";

/// Arcroles that belong to the XBRL Dimensions vocabulary.
pub fn is_dimensional_arcrole(arcrole: &str) -> bool {
    matches!(
        arcrole,
        ALL | NOT_ALL | HYPERCUBE_DIMENSION | DIMENSION_DOMAIN | DOMAIN_MEMBER | DIMENSION_DEFAULT
    )
}

/// Roles in the XBRL 2.1 role namespace need no roleType declaration.
pub fn is_standard_role(role: &str) -> bool {
    role.starts_with(STANDARD_ROLE_PREFIX)
}
