// Post-load XBRL Dimensions conformance checks
use crate::context::DtsContext;
use crate::diagnostics::{Diagnostic, ErrorKind};
use crate::dimensions::{DrsArcrole, DrsEdge};
use crate::drs::{DimensionError, DrsResolver};
use crate::model::{ElementClass, QName};
use crate::types::TypeSystem;
use crate::{Error, Result};
use compact_str::CompactString;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    SourceClass {
        code: &'static str,
        role: CompactString,
        node: QName,
        found: ElementClass,
    },
    TargetClass {
        code: &'static str,
        role: CompactString,
        node: QName,
        found: ElementClass,
    },
    HypercubeNotAbstract { hypercube: QName },
    MissingContextElement {
        role: CompactString,
        primary: QName,
        hypercube: QName,
    },
    Polymorphism {
        role: CompactString,
        node: QName,
        categories: Vec<&'static str>,
    },
    Dimension(DimensionError),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::SourceClass { code, .. } | ValidationError::TargetClass { code, .. } => *code,
            ValidationError::HypercubeNotAbstract { .. } => "xbrldte:HypercubeElementIsNotAbstractError",
            ValidationError::MissingContextElement { .. } => {
                "xbrldte:HasHypercubeMissingContextElementAttributeError"
            }
            ValidationError::Polymorphism { .. } => "xbrldte:PrimaryItemPolymorphismError",
            ValidationError::Dimension(e) => e.code(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = match self {
            ValidationError::SourceClass { role, node, found, .. } => {
                format!("{} is not a valid source in {} (classified {:?})", node, role, found)
            }
            ValidationError::TargetClass { role, node, found, .. } => {
                format!("{} is not a valid target in {} (classified {:?})", node, role, found)
            }
            ValidationError::HypercubeNotAbstract { hypercube } => {
                format!("hypercube {} is not abstract", hypercube)
            }
            ValidationError::MissingContextElement { role, primary, hypercube } => format!(
                "{} -> {} in {} has no xbrldt:contextElement",
                primary, hypercube, role
            ),
            ValidationError::Polymorphism { role, node, categories } => {
                format!("{} is used as {} in {}", node, categories.join(" and "), role)
            }
            ValidationError::Dimension(e) => e.to_string(),
        };
        Diagnostic::error(ErrorKind::Conformance, self.code(), message)
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub strict: bool,
    pub check_classes: bool,
    pub check_drs: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strict: false,
            check_classes: true,
            check_drs: true,
        }
    }
}

impl ValidatorConfig {
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn with_class_checks(mut self, enabled: bool) -> Self {
        self.check_classes = enabled;
        self
    }

    pub fn with_drs_checks(mut self, enabled: bool) -> Self {
        self.check_drs = enabled;
        self
    }
}

pub struct DtsValidator<'a> {
    ctx: &'a DtsContext,
    config: ValidatorConfig,
}

impl<'a> DtsValidator<'a> {
    pub fn new(ctx: &'a DtsContext) -> Self {
        Self {
            ctx,
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs every enabled check and reports findings to the context's sink.
    /// In strict mode any finding turns into an error.
    pub fn validate(&self) -> Result<Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.config.check_classes {
            errors.extend(self.check_edges());
            errors.extend(self.check_hypercubes_abstract());
            errors.extend(self.check_polymorphism());
        }
        if self.config.check_drs {
            errors.extend(self.check_defaults());
            errors.extend(self.check_typed_dimensions());
        }
        for error in &errors {
            self.ctx.sink().report(error.to_diagnostic());
        }

        if self.config.check_drs {
            for error in self.check_resolution() {
                // cycles are reported by the resolver itself
                if !matches!(error, ValidationError::Dimension(DimensionError::Cycle { .. })) {
                    self.ctx.sink().report(error.to_diagnostic());
                }
                errors.push(error);
            }
        }

        tracing::info!(findings = errors.len(), "DTS validation finished");

        if self.config.strict && !errors.is_empty() {
            return Err(Error::Validation(format!(
                "validation failed with {} errors",
                errors.len()
            )));
        }
        Ok(errors)
    }

    fn check_edges(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for table in self.ctx.definition_roles() {
            for edge in table.effective_edges() {
                let (source_ok, target_ok) = self.edge_classes_ok(edge);
                let (source_code, target_code) = class_codes(edge.arcrole);
                if !source_ok {
                    errors.push(ValidationError::SourceClass {
                        code: source_code,
                        role: table.role.clone(),
                        node: edge.from.clone(),
                        found: self.ctx.class_of(&edge.from),
                    });
                }
                if !target_ok {
                    errors.push(ValidationError::TargetClass {
                        code: target_code,
                        role: table.role.clone(),
                        node: edge.to.clone(),
                        found: self.ctx.class_of(&edge.to),
                    });
                }
                if edge.arcrole.is_has_hypercube() && edge.context_element.is_none() {
                    errors.push(ValidationError::MissingContextElement {
                        role: table.role.clone(),
                        primary: edge.from.clone(),
                        hypercube: edge.to.clone(),
                    });
                }
            }
        }
        errors
    }

    fn edge_classes_ok(&self, edge: &DrsEdge) -> (bool, bool) {
        let from = self.ctx.class_of(&edge.from);
        let to = self.ctx.class_of(&edge.to);
        match edge.arcrole {
            DrsArcrole::All | DrsArcrole::NotAll => {
                (from.is_plain_item(), to == ElementClass::Hypercube)
            }
            DrsArcrole::HypercubeDimension => (from == ElementClass::Hypercube, to.is_dimension()),
            DrsArcrole::DimensionDomain | DrsArcrole::DimensionDefault => {
                (from.is_dimension(), to.is_plain_item())
            }
            DrsArcrole::DomainMember => (from.is_plain_item(), to.is_plain_item()),
        }
    }

    fn check_hypercubes_abstract(&self) -> Vec<ValidationError> {
        let hypercubes: BTreeSet<&QName> = self
            .ctx
            .definition_roles()
            .flat_map(|table| table.hypercubes().iter())
            .collect();
        hypercubes
            .into_iter()
            .filter(|h| self.ctx.element(h).is_some_and(|e| !e.is_abstract))
            .map(|h| ValidationError::HypercubeNotAbstract { hypercube: h.clone() })
            .collect()
    }

    fn check_polymorphism(&self) -> Vec<ValidationError> {
        self.ctx
            .definition_roles()
            .flat_map(|table| {
                table.conflicts().iter().map(|c| ValidationError::Polymorphism {
                    role: table.role.clone(),
                    node: c.node.clone(),
                    categories: c.categories.clone(),
                })
            })
            .collect()
    }

    fn dimensions(&self) -> BTreeSet<&QName> {
        self.ctx
            .definition_roles()
            .flat_map(|table| table.dimensions().iter())
            .collect()
    }

    fn check_defaults(&self) -> Vec<ValidationError> {
        let resolver = DrsResolver::new(self.ctx);
        self.dimensions()
            .into_iter()
            .filter_map(|dimension| {
                let count = resolver.default_candidates(dimension).len();
                (count > 1).then(|| {
                    ValidationError::Dimension(DimensionError::TooManyDefaults {
                        dimension: dimension.clone(),
                        count,
                    })
                })
            })
            .collect()
    }

    fn check_typed_dimensions(&self) -> Vec<ValidationError> {
        self.dimensions()
            .into_iter()
            .filter(|d| matches!(self.ctx.class_of(d), ElementClass::Dimension { typed: true }))
            .filter(|d| {
                self.ctx
                    .definition_roles()
                    .any(|table| !table.edges_from(d, DrsArcrole::DimensionDomain).is_empty())
            })
            .map(|d| {
                ValidationError::Dimension(DimensionError::TypedDimensionWithDomain {
                    dimension: d.clone(),
                })
            })
            .collect()
    }

    /// Resolves every has-hypercube edge so target roles and cycles are
    /// exercised. Each error is kept once.
    fn check_resolution(&self) -> Vec<ValidationError> {
        let resolver = DrsResolver::new(self.ctx);
        let mut errors: Vec<ValidationError> = Vec::new();
        for table in self.ctx.definition_roles() {
            for edge in table.effective_edges().iter().filter(|e| e.arcrole.is_has_hypercube()) {
                if let Err(e) = resolver.resolve_hypercube(&edge.from, &edge.to, &table.role) {
                    let error = ValidationError::Dimension(e);
                    if !errors.contains(&error) {
                        errors.push(error);
                    }
                }
            }
        }
        errors
    }
}

fn class_codes(arcrole: DrsArcrole) -> (&'static str, &'static str) {
    match arcrole {
        DrsArcrole::All | DrsArcrole::NotAll => {
            ("xbrldte:HasHypercubeSourceError", "xbrldte:HasHypercubeTargetError")
        }
        DrsArcrole::HypercubeDimension => (
            "xbrldte:HypercubeDimensionSourceError",
            "xbrldte:HypercubeDimensionTargetError",
        ),
        DrsArcrole::DimensionDomain => (
            "xbrldte:DimensionDomainSourceError",
            "xbrldte:DimensionDomainTargetError",
        ),
        DrsArcrole::DimensionDefault => (
            "xbrldte:DimensionDefaultSourceError",
            "xbrldte:DimensionDefaultTargetError",
        ),
        DrsArcrole::DomainMember => (
            "xbrldte:DomainMemberSourceError",
            "xbrldte:DomainMemberTargetError",
        ),
    }
}
