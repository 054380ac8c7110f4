// Label lookup with language and role fallback
use crate::context::DtsContext;
use crate::linkbase::LinkKind;
use crate::model::QName;
use crate::ns;
use crate::relationships::Relationship;
use compact_str::CompactString;
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelKey {
    pub concept: QName,
    pub lang: CompactString,
    pub roles: Vec<CompactString>,
    pub link_role: CompactString,
    /// Language of the last-resort lookup; part of the answer.
    pub default_language: CompactString,
}

pub struct LabelResolver<'a> {
    ctx: &'a DtsContext,
    default_language: CompactString,
}

impl<'a> LabelResolver<'a> {
    pub fn new(ctx: &'a DtsContext) -> Self {
        Self {
            ctx,
            default_language: CompactString::from("en"),
        }
    }

    pub fn with_default_language(mut self, lang: &str) -> Self {
        self.default_language = CompactString::from(lang);
        self
    }

    /// Standard label in the standard link role.
    pub fn label(&self, concept: &QName, lang: &str) -> Option<String> {
        self.describe(concept, &[ns::LABEL_ROLE], lang, ns::STANDARD_LINK_ROLE)
    }

    /// First label matching a language form of `lang` (full tag, then the
    /// primary subtag) and one of `roles`, in that order of preference. On
    /// a complete miss the standard label in the default language is tried.
    pub fn describe(
        &self,
        concept: &QName,
        roles: &[&str],
        lang: &str,
        link_role: &str,
    ) -> Option<String> {
        let key = LabelKey {
            concept: concept.clone(),
            lang: CompactString::from(lang),
            roles: roles.iter().map(|r| CompactString::from(*r)).collect(),
            link_role: CompactString::from(link_role),
            default_language: self.default_language.clone(),
        };
        if let Some(hit) = self.ctx.label_cache.get(&key) {
            return hit;
        }

        let candidates = self.candidates(concept, link_role);
        let found = find(&candidates, roles, lang)
            .or_else(|| find(&candidates, &[ns::LABEL_ROLE], &self.default_language));
        if found.is_none() {
            tracing::debug!(concept = %concept, lang, link_role, "no label");
        }
        self.ctx.label_cache.insert(key, found)
    }

    /// `preferredLabel` of the presentation relationship parent -> child.
    pub fn preferred_label(&self, parent: &QName, child: &QName, role: &str) -> Option<CompactString> {
        self.ctx
            .presentation_children(parent, role)
            .into_iter()
            .find(|rel| rel.to.concept() == Some(child))
            .and_then(|rel| rel.arc.preferred_label.clone())
    }

    /// Label relationships of `concept`, highest priority first. Falls back
    /// to the standard link role when `link_role` has none.
    fn candidates(&self, concept: &QName, link_role: &str) -> Vec<&'a Relationship> {
        let mut candidates = self.in_role(concept, link_role);
        if candidates.is_empty() && link_role != ns::STANDARD_LINK_ROLE {
            candidates = self.in_role(concept, ns::STANDARD_LINK_ROLE);
        }
        candidates.sort_by_key(|rel| Reverse(rel.arc.priority));
        candidates
    }

    fn in_role(&self, concept: &QName, link_role: &str) -> Vec<&'a Relationship> {
        let index = self.ctx.relationships();
        let mut out = index.children_of(&LinkKind::Label, link_role, ns::CONCEPT_LABEL, concept);
        out.extend(index.children_of(&LinkKind::Generic, link_role, ns::ELEMENT_LABEL, concept));
        out
    }
}

fn find(candidates: &[&Relationship], roles: &[&str], lang: &str) -> Option<String> {
    for form in language_forms(lang) {
        for role in roles {
            let hit = candidates.iter().find_map(|rel| {
                let resource = rel.to.resource()?;
                let resource_role = resource.role.as_deref().unwrap_or(ns::LABEL_ROLE);
                let resource_lang = resource.lang.as_deref()?.to_ascii_lowercase();
                (resource_role == *role && resource_lang == form).then(|| resource.text.clone())
            });
            if hit.is_some() {
                return hit;
            }
        }
    }
    None
}

/// `en-GB` -> [`en-gb`, `en`].
fn language_forms(lang: &str) -> Vec<String> {
    let full = lang.trim().to_ascii_lowercase();
    let mut forms = vec![full.clone()];
    if let Some((base, _)) = full.split_once('-') {
        forms.push(base.to_string());
    }
    forms
}
