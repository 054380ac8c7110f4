// End-to-end DTS scenarios over in-memory taxonomies
use crabrl_dts::ns;
use crabrl_dts::{
    CollectingSink, DimensionError, DrsResolver, DtsContext, DtsLoader, DtsSnapshot, DtsValidator,
    LabelResolver, LoaderConfig, MemoryFetcher, QName, QuickXmlParser, ValidationError,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

const BASE_NS: &str = "http://test/base";
const EXT_NS: &str = "http://test/ext";
const CYC_NS: &str = "http://test/cyc";
const SALES_ROLE: &str = "http://test/base/role/sales";

const DECLS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:xbrli="http://www.xbrl.org/2003/instance" xmlns:xbrldt="http://xbrl.org/2005/xbrldt" xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink""#;

fn schema(namespace: &str, prefix: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<xs:schema {DECLS} xmlns:{prefix}="{namespace}" targetNamespace="{namespace}" elementFormDefault="qualified">
{body}
</xs:schema>"#
    )
}

fn linkbase(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<link:linkbase {DECLS}>
{body}
</link:linkbase>"#
    )
}

fn item(prefix: &str, name: &str) -> String {
    format!(
        r#"<xs:element id="{prefix}_{name}" name="{name}" type="xbrli:monetaryItemType" substitutionGroup="xbrli:item" xbrli:periodType="duration"/>"#
    )
}

fn abstract_element(prefix: &str, name: &str, group: &str) -> String {
    format!(
        r#"<xs:element id="{prefix}_{name}" name="{name}" type="xbrli:stringItemType" abstract="true" substitutionGroup="{group}" xbrli:periodType="duration"/>"#
    )
}

fn loc(href: &str, label: &str) -> String {
    format!(r#"<link:loc xlink:type="locator" xlink:href="{href}" xlink:label="{label}"/>"#)
}

fn def_arc(arcrole: &str, from: &str, to: &str, extra: &str) -> String {
    format!(
        r#"<link:definitionArc xlink:type="arc" xlink:arcrole="{arcrole}" xlink:from="{from}" xlink:to="{to}" {extra}/>"#
    )
}

fn definition_link(role: &str, body: &str) -> String {
    format!(r#"<link:definitionLink xlink:type="extended" xlink:role="{role}">{body}</link:definitionLink>"#)
}

fn linkbase_ref(href: &str) -> String {
    format!(
        r#"<link:linkbaseRef xlink:type="simple" xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase" xlink:href="{href}"/>"#
    )
}

fn appinfo(body: &str) -> String {
    format!("<xs:annotation><xs:appinfo>{body}</xs:appinfo></xs:annotation>")
}

/// Base taxonomy: Sales is dimensioned by RegionAxis with members North
/// and South under RegionDomain, which is also the default.
fn base_documents(fetcher: &mut MemoryFetcher) {
    let role_type = format!(
        r#"<link:roleType roleURI="{SALES_ROLE}" id="sales"><link:definition>Sales by region</link:definition><link:usedOn>link:definitionLink</link:usedOn></link:roleType>"#
    );
    let body = [
        appinfo(&format!(
            "{}{}{}",
            linkbase_ref("base-def.xml"),
            linkbase_ref("base-lab.xml"),
            role_type
        )),
        item("base", "Sales"),
        item("base", "Cash"),
        abstract_element("base", "SalesTable", "xbrldt:hypercubeItem"),
        abstract_element("base", "RegionAxis", "xbrldt:dimensionItem"),
        abstract_element("base", "RegionDomain", "xbrli:item"),
        item("base", "North"),
        item("base", "South"),
    ]
    .join("\n");
    fetcher.insert("base/base.xsd", schema(BASE_NS, "base", &body));

    let locs: String = ["Sales", "SalesTable", "RegionAxis", "RegionDomain", "North", "South"]
        .iter()
        .map(|name| loc(&format!("base.xsd#base_{name}"), name))
        .collect();
    let arcs = [
        def_arc(ns::ALL, "Sales", "SalesTable", r#"xbrldt:contextElement="segment" xbrldt:closed="true""#),
        def_arc(ns::HYPERCUBE_DIMENSION, "SalesTable", "RegionAxis", ""),
        def_arc(ns::DIMENSION_DOMAIN, "RegionAxis", "RegionDomain", ""),
        def_arc(ns::DOMAIN_MEMBER, "RegionDomain", "North", r#"order="1""#),
        def_arc(ns::DOMAIN_MEMBER, "RegionDomain", "South", r#"order="2""#),
        def_arc(ns::DIMENSION_DEFAULT, "RegionAxis", "RegionDomain", ""),
    ]
    .concat();
    let role_ref = format!(r#"<link:roleRef roleURI="{SALES_ROLE}" xlink:type="simple" xlink:href="base.xsd#sales"/>"#);
    fetcher.insert(
        "base/base-def.xml",
        linkbase(&format!("{role_ref}{}", definition_link(SALES_ROLE, &format!("{locs}{arcs}")))),
    );

    let labels = format!(
        r#"<link:labelLink xlink:type="extended" xlink:role="{link}">
{loc}
<link:label xlink:type="resource" xlink:label="lab_Sales" xlink:role="{label}" xml:lang="en">Sales</link:label>
<link:label xlink:type="resource" xlink:label="lab_Sales" xlink:role="{terse}" xml:lang="en">Sales (terse)</link:label>
<link:label xlink:type="resource" xlink:label="lab_Sales" xlink:role="{label}" xml:lang="de">Umsatz</link:label>
<link:labelArc xlink:type="arc" xlink:arcrole="{arcrole}" xlink:from="loc_Sales" xlink:to="lab_Sales"/>
</link:labelLink>"#,
        link = ns::STANDARD_LINK_ROLE,
        loc = loc("base.xsd#base_Sales", "loc_Sales"),
        label = ns::LABEL_ROLE,
        terse = ns::TERSE_LABEL_ROLE,
        arcrole = ns::CONCEPT_LABEL,
    );
    fetcher.insert("base/base-lab.xml", linkbase(&labels));
}

/// Extension importing the base and prohibiting the RegionAxis domain.
fn extension_documents(fetcher: &mut MemoryFetcher) {
    let body = [
        appinfo(&linkbase_ref("ext-def.xml")),
        format!(r#"<xs:import namespace="{BASE_NS}" schemaLocation="../base/base.xsd"/>"#),
        item("ext", "Widgets"),
    ]
    .join("\n");
    fetcher.insert("ext/ext.xsd", schema(EXT_NS, "ext", &body));

    let link = definition_link(
        SALES_ROLE,
        &format!(
            "{}{}{}",
            loc("../base/base.xsd#base_RegionAxis", "RegionAxis"),
            loc("../base/base.xsd#base_RegionDomain", "RegionDomain"),
            def_arc(
                ns::DIMENSION_DOMAIN,
                "RegionAxis",
                "RegionDomain",
                r#"use="prohibited" priority="1""#
            ),
        ),
    );
    fetcher.insert("ext/ext-def.xml", linkbase(&link));
}

/// Domain A -> B -> A under one hypercube, optionally with domain-member
/// redeclared as `cyclesAllowed="any"`.
fn cycle_documents(allow_any: bool) -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    let arcrole_type = if allow_any {
        format!(
            r#"<link:arcroleType arcroleURI="{}" cyclesAllowed="any" id="dm"><link:usedOn>link:definitionArc</link:usedOn></link:arcroleType>"#,
            ns::DOMAIN_MEMBER
        )
    } else {
        String::new()
    };
    let body = [
        appinfo(&format!("{}{}", linkbase_ref("cyc-def.xml"), arcrole_type)),
        item("cyc", "Primary"),
        abstract_element("cyc", "Table", "xbrldt:hypercubeItem"),
        abstract_element("cyc", "Axis", "xbrldt:dimensionItem"),
        abstract_element("cyc", "Domain", "xbrli:item"),
        item("cyc", "A"),
        item("cyc", "B"),
    ]
    .join("\n");
    fetcher.insert("cyc/cyc.xsd", schema(CYC_NS, "cyc", &body));

    let locs: String = ["Primary", "Table", "Axis", "Domain", "A", "B"]
        .iter()
        .map(|name| loc(&format!("cyc.xsd#cyc_{name}"), name))
        .collect();
    let arcs = [
        def_arc(ns::ALL, "Primary", "Table", r#"xbrldt:contextElement="scenario""#),
        def_arc(ns::HYPERCUBE_DIMENSION, "Table", "Axis", ""),
        def_arc(ns::DIMENSION_DOMAIN, "Axis", "Domain", ""),
        def_arc(ns::DOMAIN_MEMBER, "Domain", "A", ""),
        def_arc(ns::DOMAIN_MEMBER, "A", "B", ""),
        def_arc(ns::DOMAIN_MEMBER, "B", "A", ""),
    ]
    .concat();
    fetcher.insert(
        "cyc/cyc-def.xml",
        linkbase(&definition_link(ns::STANDARD_LINK_ROLE, &format!("{locs}{arcs}"))),
    );
    fetcher
}

fn fixture() -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    base_documents(&mut fetcher);
    extension_documents(&mut fetcher);
    fetcher
}

fn load_with(fetcher: &MemoryFetcher, entries: &[&str], config: LoaderConfig) -> (DtsContext, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let mut ctx = DtsContext::with_sink(sink.clone());
    DtsLoader::new(&mut ctx, fetcher, &QuickXmlParser)
        .with_config(config)
        .load(entries)
        .expect("DTS should load");
    (ctx, sink)
}

fn load(fetcher: &MemoryFetcher, entries: &[&str]) -> (DtsContext, Arc<CollectingSink>) {
    load_with(fetcher, entries, LoaderConfig::default())
}

fn base(local: &str) -> QName {
    QName::new(BASE_NS, local)
}

fn cyc(local: &str) -> QName {
    QName::new(CYC_NS, local)
}

fn member_names(ctx: &DtsContext, role: &str) -> Vec<String> {
    let cube = DrsResolver::new(ctx)
        .resolve_hypercube(&base("Sales"), &base("SalesTable"), role)
        .expect("hypercube should resolve");
    cube.tree
        .dimension(&base("RegionAxis"))
        .expect("RegionAxis in tree")
        .members()
        .into_iter()
        .map(|q| q.local_name.to_string())
        .collect()
}

#[test]
fn test_base_dimension_members() {
    let fetcher = fixture();
    let (ctx, sink) = load(&fetcher, &["base/base.xsd"]);

    assert_eq!(ctx.main_namespace.as_deref(), Some(BASE_NS));
    assert_eq!(member_names(&ctx, SALES_ROLE), vec!["RegionDomain", "North", "South"]);

    let cube = DrsResolver::new(&ctx)
        .resolve_hypercube(&base("Sales"), &base("SalesTable"), SALES_ROLE)
        .unwrap();
    assert!(cube.closed);
    assert_eq!(cube.context_element.as_deref(), Some("segment"));
    let axis = cube.tree.dimension(&base("RegionAxis")).unwrap();
    assert!(!axis.typed);
    assert_eq!(axis.default, Some(base("RegionDomain")));
    assert!(!sink.has_code("xbrl.5.1.3:roleNotUsable"));
}

#[test]
fn test_prohibited_domain_leaves_no_members() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["ext/ext.xsd"]);

    assert_eq!(ctx.main_namespace.as_deref(), Some(EXT_NS));
    assert_eq!(ctx.node_count(), 2);
    assert!(member_names(&ctx, SALES_ROLE).is_empty());
}

#[test]
fn test_override_independent_of_load_order() {
    let fetcher = fixture();
    let serial = LoaderConfig::default().with_parallel(false);
    let (forward, _) = load_with(&fetcher, &["base/base.xsd", "ext/ext.xsd"], serial.clone());
    let (backward, _) = load_with(&fetcher, &["ext/ext.xsd", "base/base.xsd"], serial);

    assert!(member_names(&forward, SALES_ROLE).is_empty());
    assert!(member_names(&backward, SALES_ROLE).is_empty());
}

#[test]
fn test_hypercube_resolution_is_memoized() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["base/base.xsd"]);
    let resolver = DrsResolver::new(&ctx);

    let first = resolver
        .resolve_hypercube(&base("Sales"), &base("SalesTable"), SALES_ROLE)
        .unwrap();
    let second = resolver
        .resolve_hypercube(&base("Sales"), &base("SalesTable"), SALES_ROLE)
        .unwrap();

    assert!(Arc::ptr_eq(&first.tree, &second.tree));
    assert_eq!(ctx.drs_cache_stats(), (1, 1));
}

#[test]
fn test_unlinked_hypercube() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["base/base.xsd"]);

    let err = DrsResolver::new(&ctx)
        .resolve_hypercube(&base("Cash"), &base("SalesTable"), SALES_ROLE)
        .unwrap_err();
    assert_eq!(err.code(), "xbrldte:HypercubeNotLinked");
}

#[test]
fn test_label_fallbacks() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["base/base.xsd"]);
    let labels = LabelResolver::new(&ctx);
    let sales = base("Sales");

    assert_eq!(labels.label(&sales, "en").as_deref(), Some("Sales"));
    assert_eq!(labels.label(&sales, "de").as_deref(), Some("Umsatz"));
    assert_eq!(
        labels
            .describe(
                &sales,
                &[ns::TOTAL_LABEL_ROLE, ns::TERSE_LABEL_ROLE],
                "en-GB",
                ns::STANDARD_LINK_ROLE
            )
            .as_deref(),
        Some("Sales (terse)")
    );
    // no French labels: standard label in the default language
    assert_eq!(
        labels
            .describe(&sales, &[ns::TERSE_LABEL_ROLE], "fr", ns::STANDARD_LINK_ROLE)
            .as_deref(),
        Some("Sales")
    );
    assert_eq!(labels.label(&base("Cash"), "en"), None);
}

#[test]
fn test_directed_cycle_rejected() {
    let fetcher = cycle_documents(false);
    let (ctx, sink) = load(&fetcher, &["cyc/cyc.xsd"]);

    let err = DrsResolver::new(&ctx)
        .resolve_hypercube(&cyc("Primary"), &cyc("Table"), ns::STANDARD_LINK_ROLE)
        .unwrap_err();
    assert!(matches!(err, DimensionError::Cycle { .. }));
    assert!(sink.has_code("xbrldte:DRSDirectedCycleError"));
}

#[test]
fn test_directed_cycle_allowed_by_arcrole_type() {
    let fetcher = cycle_documents(true);
    let (ctx, sink) = load(&fetcher, &["cyc/cyc.xsd"]);

    let cube = DrsResolver::new(&ctx)
        .resolve_hypercube(&cyc("Primary"), &cyc("Table"), ns::STANDARD_LINK_ROLE)
        .unwrap();
    let members: Vec<&str> = cube
        .tree
        .dimension(&cyc("Axis"))
        .unwrap()
        .members()
        .into_iter()
        .map(|q| q.local_name.as_str())
        .collect();
    assert_eq!(members, vec!["Domain", "A", "B", "A"]);
    assert!(!sink.has_code("xbrldte:DRSDirectedCycleError"));
}

#[test]
fn test_validator_reports_cycle_once() {
    let fetcher = cycle_documents(false);
    let (ctx, sink) = load(&fetcher, &["cyc/cyc.xsd"]);

    let findings = DtsValidator::new(&ctx).validate().unwrap();
    assert_eq!(
        findings
            .iter()
            .filter(|f| f.code() == "xbrldte:DRSDirectedCycleError")
            .count(),
        1
    );
    assert!(findings
        .iter()
        .all(|f| !matches!(f, ValidationError::HypercubeNotAbstract { .. })));
    assert!(sink.has_code("xbrldte:DRSDirectedCycleError"));
}

#[test]
fn test_valid_taxonomy_has_no_findings() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["ext/ext.xsd"]);
    let findings = DtsValidator::new(&ctx).validate().unwrap();
    assert_eq!(findings, Vec::new());
}

#[test]
fn test_missing_entry_is_fatal() {
    let fetcher = fixture();
    let mut ctx = DtsContext::with_sink(Arc::new(CollectingSink::new()));
    let result = DtsLoader::new(&mut ctx, &fetcher, &QuickXmlParser).load(&["nowhere.xsd"]);
    assert!(matches!(result, Err(crabrl_dts::Error::Configuration(_))));
}

#[test]
fn test_missing_import_is_reported() {
    let mut fetcher = MemoryFetcher::new();
    fetcher.insert(
        "lonely.xsd",
        schema(
            "http://test/lonely",
            "lonely",
            r#"<xs:import namespace="http://test/gone" schemaLocation="gone.xsd"/>"#,
        ),
    );
    let (ctx, sink) = load(&fetcher, &["lonely.xsd"]);

    assert_eq!(ctx.node_count(), 1);
    assert!(sink.has_code("dts:documentNotFound"));
}

#[test]
fn test_include_merges_into_including_node() {
    let mut fetcher = MemoryFetcher::new();
    fetcher.insert(
        "inc/main.xsd",
        schema(
            "http://test/inc",
            "inc",
            &format!(r#"<xs:include schemaLocation="part.xsd"/>{}"#, item("inc", "Revenue")),
        ),
    );
    // chameleon include: no targetNamespace of its own
    fetcher.insert(
        "inc/part.xsd",
        format!(
            r#"<xs:schema {DECLS}>{}</xs:schema>"#,
            r#"<xs:element id="inc_Costs" name="Costs" type="xbrli:monetaryItemType" substitutionGroup="xbrli:item" xbrli:periodType="duration"/>"#
        ),
    );
    let (ctx, _) = load(&fetcher, &["inc/main.xsd"]);

    assert_eq!(ctx.node_count(), 1);
    let id = ctx.node_by_location("inc/part.xsd").unwrap();
    assert_eq!(Some(id), ctx.node_by_namespace("http://test/inc"));
    let node = ctx.node(id).unwrap();
    assert!(node.element("Revenue").is_some());
    assert!(node.element("Costs").is_some());
}

#[test]
fn test_locator_discovery() {
    let mut fetcher = MemoryFetcher::new();
    base_documents(&mut fetcher);
    // the entry never imports the base; only its linkbase points there
    fetcher.insert(
        "disc/disc.xsd",
        schema("http://test/disc", "disc", &appinfo(&linkbase_ref("disc-def.xml"))),
    );
    let link = definition_link(
        SALES_ROLE,
        &format!(
            "{}{}{}",
            loc("../base/base.xsd#base_RegionDomain", "RegionDomain"),
            loc("../base/base.xsd#base_Cash", "Cash"),
            def_arc(ns::DOMAIN_MEMBER, "RegionDomain", "Cash", ""),
        ),
    );
    fetcher.insert("disc/disc-def.xml", linkbase(&link));

    let (without, _) = load_with(
        &fetcher,
        &["disc/disc.xsd"],
        LoaderConfig::default().with_locator_discovery(false),
    );
    assert_eq!(without.node_count(), 1);

    let (with, _) = load(&fetcher, &["disc/disc.xsd"]);
    assert!(with.node_by_namespace(BASE_NS).is_some());
    assert_eq!(member_names(&with, SALES_ROLE), vec!["RegionDomain", "Cash", "North", "South"]);
}

#[test]
fn test_snapshot_round_trip() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["base/base.xsd"]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("base.json");

    DtsSnapshot::capture(&ctx).save(&path).unwrap();
    let restored = DtsSnapshot::load(&path)
        .unwrap()
        .restore(Arc::new(CollectingSink::new()))
        .unwrap();

    assert_eq!(restored.node_count(), ctx.node_count());
    assert_eq!(restored.main_namespace, ctx.main_namespace);
    assert_eq!(member_names(&restored, SALES_ROLE), member_names(&ctx, SALES_ROLE));
    assert_eq!(
        LabelResolver::new(&restored).label(&base("Sales"), "de").as_deref(),
        Some("Umsatz")
    );
}

#[test]
fn test_extension_snapshot_carries_only_additions() {
    let fetcher = fixture();
    let (base_ctx, _) = load(&fetcher, &["base/base.xsd"]);
    let (ext_ctx, _) = load(&fetcher, &["ext/ext.xsd"]);

    let base_snapshot = DtsSnapshot::capture(&base_ctx);
    let ext_snapshot = DtsSnapshot::capture_extension(&ext_ctx, &base_snapshot);

    assert_eq!(ext_snapshot.base_taxonomy.as_deref(), Some(BASE_NS));
    assert_eq!(ext_snapshot.nodes.len(), 1);
    assert_eq!(ext_snapshot.nodes[0].namespace.as_str(), EXT_NS);
    assert!(ext_snapshot.links.iter().all(|l| l.document == "ext/ext-def.xml"));
    assert!(ext_snapshot.role_types.is_empty());

    let layered =
        DtsSnapshot::restore_extension(&base_snapshot, &ext_snapshot, Arc::new(CollectingSink::new()))
            .unwrap();
    assert_eq!(layered.main_namespace.as_deref(), Some(EXT_NS));
    assert!(member_names(&layered, SALES_ROLE).is_empty());

    let mismatched = DtsSnapshot::restore_extension(
        &ext_snapshot,
        &ext_snapshot,
        Arc::new(CollectingSink::new()),
    );
    assert!(mismatched.is_err());
}

const TR_NS: &str = "http://test/tr";
const OUTER_ROLE: &str = "http://test/tr/role/outer";
const INNER_ROLE: &str = "http://test/tr/role/inner";

/// Primary -> Table in the outer role is redirected to the inner role,
/// which holds the dimensions. `OldAxis` hangs off Table in the outer role
/// and must be cut off by the redirection.
fn target_role_documents(target_role: &str, hypercube_abstract: bool) -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    let role_types: String = [("outer", OUTER_ROLE), ("inner", INNER_ROLE)]
        .iter()
        .map(|(id, uri)| {
            format!(
                r#"<link:roleType roleURI="{uri}" id="{id}"><link:usedOn>link:definitionLink</link:usedOn></link:roleType>"#
            )
        })
        .collect();
    let table = if hypercube_abstract {
        abstract_element("tr", "Table", "xbrldt:hypercubeItem")
    } else {
        r#"<xs:element id="tr_Table" name="Table" type="xbrli:stringItemType" substitutionGroup="xbrldt:hypercubeItem" xbrli:periodType="duration"/>"#.to_string()
    };
    let body = [
        appinfo(&format!("{}{}", linkbase_ref("tr-def.xml"), role_types)),
        item("tr", "Primary"),
        table,
        abstract_element("tr", "Axis", "xbrldt:dimensionItem"),
        abstract_element("tr", "OldAxis", "xbrldt:dimensionItem"),
        abstract_element("tr", "Domain", "xbrli:item"),
        item("tr", "Member"),
    ]
    .join("\n");
    fetcher.insert("tr/tr.xsd", schema(TR_NS, "tr", &body));

    let locs = |names: &[&str]| -> String {
        names
            .iter()
            .map(|name| loc(&format!("tr.xsd#tr_{name}"), name))
            .collect()
    };
    let outer = definition_link(
        OUTER_ROLE,
        &format!(
            "{}{}{}",
            locs(&["Primary", "Table", "OldAxis"]),
            def_arc(
                ns::ALL,
                "Primary",
                "Table",
                &format!(r#"xbrldt:contextElement="segment" xbrldt:targetRole="{target_role}""#)
            ),
            def_arc(ns::HYPERCUBE_DIMENSION, "Table", "OldAxis", ""),
        ),
    );
    let inner = definition_link(
        INNER_ROLE,
        &format!(
            "{}{}{}{}",
            locs(&["Table", "Axis", "Domain", "Member"]),
            def_arc(ns::HYPERCUBE_DIMENSION, "Table", "Axis", ""),
            def_arc(ns::DIMENSION_DOMAIN, "Axis", "Domain", ""),
            def_arc(ns::DOMAIN_MEMBER, "Domain", "Member", r#"xbrldt:usable="false""#),
        ),
    );
    fetcher.insert("tr/tr-def.xml", linkbase(&format!("{outer}{inner}")));
    fetcher
}

fn tr(local: &str) -> QName {
    QName::new(TR_NS, local)
}

#[test]
fn test_target_role_redirects_hypercube() {
    let fetcher = target_role_documents(INNER_ROLE, true);
    let (ctx, _) = load(&fetcher, &["tr/tr.xsd"]);

    let cube = DrsResolver::new(&ctx)
        .resolve_hypercube(&tr("Primary"), &tr("Table"), OUTER_ROLE)
        .unwrap();
    let dimensions: Vec<&QName> = cube.tree.dimensions.iter().map(|d| &d.dimension).collect();
    assert_eq!(dimensions, vec![&tr("Axis")]);

    let axis = cube.tree.dimension(&tr("Axis")).unwrap();
    assert_eq!(axis.members(), vec![&tr("Domain"), &tr("Member")]);
    assert_eq!(axis.usable_members(), vec![&tr("Domain")]);
}

#[test]
fn test_unresolved_target_role() {
    let fetcher = target_role_documents("http://test/tr/role/missing", true);
    let (ctx, _) = load(&fetcher, &["tr/tr.xsd"]);

    let err = DrsResolver::new(&ctx)
        .resolve_hypercube(&tr("Primary"), &tr("Table"), OUTER_ROLE)
        .unwrap_err();
    assert!(matches!(err, DimensionError::TargetRoleNotResolved { .. }));
    assert_eq!(err.code(), "xbrldte:TargetRoleNotResolvedError");
}

#[test]
fn test_strict_validation_fails_on_concrete_hypercube() {
    let fetcher = target_role_documents(INNER_ROLE, false);
    let (ctx, sink) = load(&fetcher, &["tr/tr.xsd"]);

    let findings = DtsValidator::new(&ctx).validate().unwrap();
    assert!(findings.contains(&ValidationError::HypercubeNotAbstract { hypercube: tr("Table") }));
    assert!(sink.has_code("xbrldte:HypercubeElementIsNotAbstractError"));

    let strict = DtsValidator::new(&ctx)
        .with_config(crabrl_dts::ValidatorConfig::default().strict())
        .validate();
    assert!(matches!(strict, Err(crabrl_dts::Error::Validation(_))));
}

const PC_NS: &str = "http://test/pc";

/// Parent -> Table, with Parent and Child pointing at each other through
/// domain-member.
fn primary_cycle_documents(allow_any: bool) -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    let arcrole_type = if allow_any {
        format!(
            r#"<link:arcroleType arcroleURI="{}" cyclesAllowed="any" id="dm"><link:usedOn>link:definitionArc</link:usedOn></link:arcroleType>"#,
            ns::DOMAIN_MEMBER
        )
    } else {
        String::new()
    };
    let body = [
        appinfo(&format!("{}{}", linkbase_ref("pc-def.xml"), arcrole_type)),
        item("pc", "Parent"),
        item("pc", "Child"),
        abstract_element("pc", "Table", "xbrldt:hypercubeItem"),
        abstract_element("pc", "Axis", "xbrldt:dimensionItem"),
    ]
    .join("\n");
    fetcher.insert("pc/pc.xsd", schema(PC_NS, "pc", &body));

    let locs: String = ["Parent", "Child", "Table", "Axis"]
        .iter()
        .map(|name| loc(&format!("pc.xsd#pc_{name}"), name))
        .collect();
    let arcs = [
        def_arc(ns::ALL, "Parent", "Table", r#"xbrldt:contextElement="segment""#),
        def_arc(ns::HYPERCUBE_DIMENSION, "Table", "Axis", ""),
        def_arc(ns::DOMAIN_MEMBER, "Parent", "Child", ""),
        def_arc(ns::DOMAIN_MEMBER, "Child", "Parent", ""),
    ]
    .concat();
    fetcher.insert(
        "pc/pc-def.xml",
        linkbase(&definition_link(ns::STANDARD_LINK_ROLE, &format!("{locs}{arcs}"))),
    );
    fetcher
}

#[test]
fn test_primary_item_cycle_rejected() {
    let fetcher = primary_cycle_documents(false);
    let (ctx, sink) = load(&fetcher, &["pc/pc.xsd"]);
    let pc = |local: &str| QName::new(PC_NS, local);

    let err = DrsResolver::new(&ctx)
        .resolve_hypercube(&pc("Child"), &pc("Table"), ns::STANDARD_LINK_ROLE)
        .unwrap_err();
    assert!(matches!(err, DimensionError::Cycle { .. }));
    assert!(sink.has_code("xbrldte:DRSDirectedCycleError"));

    let findings = DtsValidator::new(&ctx).validate().unwrap();
    assert!(findings
        .iter()
        .any(|f| f.code() == "xbrldte:DRSDirectedCycleError"));
}

#[test]
fn test_primary_item_cycle_allowed_by_arcrole_type() {
    let fetcher = primary_cycle_documents(true);
    let (ctx, sink) = load(&fetcher, &["pc/pc.xsd"]);
    let pc = |local: &str| QName::new(PC_NS, local);

    let cube = DrsResolver::new(&ctx)
        .resolve_hypercube(&pc("Child"), &pc("Table"), ns::STANDARD_LINK_ROLE)
        .unwrap();
    assert_eq!(cube.hypercube, pc("Table"));
    assert_eq!(cube.primary_item, pc("Child"));
    assert!(!sink.has_code("xbrldte:DRSDirectedCycleError"));
}

#[test]
fn test_label_cache_separates_default_languages() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["base/base.xsd"]);
    let sales = base("Sales");
    let roles = [ns::TOTAL_LABEL_ROLE];

    let german = LabelResolver::new(&ctx).with_default_language("de");
    assert_eq!(
        german.describe(&sales, &roles, "fr", ns::STANDARD_LINK_ROLE).as_deref(),
        Some("Umsatz")
    );
    let english = LabelResolver::new(&ctx).with_default_language("en");
    assert_eq!(
        english.describe(&sales, &roles, "fr", ns::STANDARD_LINK_ROLE).as_deref(),
        Some("Sales")
    );
    // a repeat is answered from the cache
    assert_eq!(
        german.describe(&sales, &roles, "fr", ns::STANDARD_LINK_ROLE).as_deref(),
        Some("Umsatz")
    );
}

#[test]
fn test_node_tables_keep_own_arcs_only() {
    let fetcher = fixture();
    let (ctx, _) = load(&fetcher, &["ext/ext.xsd"]);
    let base_id = ctx.node_by_namespace(BASE_NS).unwrap();
    let ext_id = ctx.node_by_namespace(EXT_NS).unwrap();

    let own = ctx.node_definition_role(base_id, SALES_ROLE).unwrap();
    assert_eq!(own.effective_edges().len(), 6);
    assert_eq!(own.members().len(), 3);

    // the extension's only arc is a prohibition
    let ext = ctx.node_definition_role(ext_id, SALES_ROLE).unwrap();
    assert!(ext.effective_edges().is_empty());

    let merged = ctx.definition_role(SALES_ROLE).unwrap();
    assert_eq!(merged.effective_edges().len(), 5);
    assert!(ctx.node_definition_role(ext_id, ns::STANDARD_LINK_ROLE).is_none());
}

#[test]
fn test_extension_snapshot_keeps_widened_role() {
    let mut fetcher = MemoryFetcher::new();
    base_documents(&mut fetcher);
    let widened = format!(
        r#"<link:roleType roleURI="{SALES_ROLE}" id="sales"><link:usedOn>link:definitionLink</link:usedOn><link:usedOn>link:presentationLink</link:usedOn></link:roleType>"#
    );
    let body = [
        appinfo(&widened),
        format!(r#"<xs:import namespace="{BASE_NS}" schemaLocation="../base/base.xsd"/>"#),
    ]
    .join("\n");
    fetcher.insert("wide/wide.xsd", schema("http://test/wide", "wide", &body));

    let (base_ctx, _) = load(&fetcher, &["base/base.xsd"]);
    let (wide_ctx, _) = load(&fetcher, &["wide/wide.xsd"]);
    let presentation = QName::new(ns::LINK, "presentationLink");
    assert!(!base_ctx.registry().is_role_usable_on(SALES_ROLE, &presentation));
    assert!(wide_ctx.registry().is_role_usable_on(SALES_ROLE, &presentation));

    let base_snapshot = DtsSnapshot::capture(&base_ctx);
    let ext_snapshot = DtsSnapshot::capture_extension(&wide_ctx, &base_snapshot);
    let uris: Vec<&str> = ext_snapshot.role_types.iter().map(|r| r.uri.as_str()).collect();
    assert_eq!(uris, vec![SALES_ROLE]);

    let layered =
        DtsSnapshot::restore_extension(&base_snapshot, &ext_snapshot, Arc::new(CollectingSink::new()))
            .unwrap();
    assert!(layered.registry().is_role_usable_on(SALES_ROLE, &presentation));
    assert!(layered
        .registry()
        .is_role_usable_on(SALES_ROLE, &QName::new(ns::LINK, "definitionLink")));
}
