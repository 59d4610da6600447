//! Per-detector label resolution.
//!
//! A `TaxonomyPolicy` is configuration: an ordered list of role rules and the
//! way labels are matched against them. It is compiled into a `LabelResolver`
//! and then bound once against a detector's class list, producing a
//! `BoundTaxonomy` that maps model class ids straight to roles.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::detect::{ClassRole, ClassTaxonomy, Detection, DetectorSource, RawDetection};
use crate::error::PipelineError;

/// How rule labels are compared against model labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Case-insensitive equality with one of the aliases.
    Exact,
    /// The model label contains one of the markers.
    Substring,
    /// The model label matches one of the regular expressions.
    Pattern,
}

/// One role and the labels that resolve to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
    pub role: ClassRole,
    pub labels: Vec<String>,
}

/// Taxonomy resolution policy for one detector. Rules are tried in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyPolicy {
    #[serde(rename = "match")]
    pub kind: MatchKind,
    pub rules: Vec<RoleRule>,
    /// Roles the detector's class list must be able to produce.
    #[serde(default)]
    pub require: Vec<ClassRole>,
}

impl TaxonomyPolicy {
    pub fn new(kind: MatchKind) -> Self {
        Self {
            kind,
            rules: Vec::new(),
            require: Vec::new(),
        }
    }

    pub fn exact() -> Self {
        Self::new(MatchKind::Exact)
    }

    pub fn substring() -> Self {
        Self::new(MatchKind::Substring)
    }

    pub fn pattern() -> Self {
        Self::new(MatchKind::Pattern)
    }

    pub fn rule<I, S>(mut self, role: ClassRole, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(RoleRule {
            role,
            labels: labels.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn require(mut self, role: ClassRole) -> Self {
        if !self.require.contains(&role) {
            self.require.push(role);
        }
        self
    }

    /// Default for the visual fire/smoke model.
    pub fn default_primary() -> Self {
        Self::exact()
            .rule(ClassRole::Fire, ["fire"])
            .rule(ClassRole::Smoke, ["smoke"])
            .require(ClassRole::Fire)
    }

    /// Default for the thermal-signature model.
    pub fn default_thermal() -> Self {
        Self::exact()
            .rule(ClassRole::Thermal, ["thermal", "fire_thermal"])
            .require(ClassRole::Thermal)
    }

    /// Check the rules and build the matcher.
    pub fn compile(&self) -> Result<LabelResolver, String> {
        if self.rules.is_empty() {
            return Err("taxonomy has no rules".to_string());
        }
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !rule.role.is_resolved() {
                return Err("rules cannot target the unknown role".to_string());
            }
            if rule.labels.iter().all(|l| l.trim().is_empty()) {
                return Err(format!("rule for {} has no labels", rule.role));
            }
            let matchers = rule
                .labels
                .iter()
                .filter(|l| !l.trim().is_empty())
                .map(|label| Matcher::new(self.kind, label))
                .collect::<Result<Vec<_>, _>>()?;
            rules.push((rule.role, matchers));
        }
        Ok(LabelResolver {
            rules,
            require: self.require.clone(),
        })
    }
}

#[derive(Clone, Debug)]
enum Matcher {
    Exact(String),
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    fn new(kind: MatchKind, label: &str) -> Result<Self, String> {
        Ok(match kind {
            MatchKind::Exact => Matcher::Exact(label.trim().to_lowercase()),
            MatchKind::Substring => Matcher::Substring(label.to_string()),
            MatchKind::Pattern => Matcher::Pattern(
                Regex::new(label).map_err(|e| format!("invalid pattern {:?}: {}", label, e))?,
            ),
        })
    }

    fn matches(&self, label: &str) -> bool {
        match self {
            Matcher::Exact(alias) => label.trim().to_lowercase() == *alias,
            Matcher::Substring(marker) => label.contains(marker.as_str()),
            Matcher::Pattern(re) => re.is_match(label),
        }
    }
}

/// Compiled form of a `TaxonomyPolicy`.
#[derive(Clone, Debug)]
pub struct LabelResolver {
    rules: Vec<(ClassRole, Vec<Matcher>)>,
    require: Vec<ClassRole>,
}

impl LabelResolver {
    /// Role for a free-text label; `Unknown` when no rule matches.
    pub fn resolve(&self, label: &str) -> ClassRole {
        self.rules
            .iter()
            .find(|(_, matchers)| matchers.iter().any(|m| m.matches(label)))
            .map(|(role, _)| *role)
            .unwrap_or(ClassRole::Unknown)
    }

    /// Resolve every class the detector reports and check required roles.
    ///
    /// With no required roles, at least one class must resolve to something.
    pub fn bind(
        &self,
        source: DetectorSource,
        taxonomy: &ClassTaxonomy,
    ) -> Result<BoundTaxonomy, PipelineError> {
        let table: BTreeMap<u32, (String, ClassRole)> = taxonomy
            .iter()
            .map(|(id, label)| (*id, (label.clone(), self.resolve(label))))
            .collect();

        let produced: Vec<ClassRole> = table.values().map(|(_, role)| *role).collect();
        let missing: Vec<String> = self
            .require
            .iter()
            .filter(|role| !produced.contains(role))
            .map(|role| role.to_string())
            .collect();

        let labels = || {
            taxonomy
                .values()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !missing.is_empty() {
            return Err(PipelineError::Taxonomy {
                role: source,
                reason: format!(
                    "no model class resolves to required role(s) {} (model classes: [{}])",
                    missing.join(", "),
                    labels()
                ),
            });
        }
        if !produced.iter().any(|role| role.is_resolved()) {
            return Err(PipelineError::Taxonomy {
                role: source,
                reason: format!("no model class resolves to a known role (model classes: [{}])", labels()),
            });
        }

        for (id, (label, role)) in &table {
            log::debug!("{} class {} {:?} -> {}", source, id, label, role);
        }
        Ok(BoundTaxonomy { source, table })
    }
}

/// Class id to (label, role) table for one loaded detector.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundTaxonomy {
    source: DetectorSource,
    table: BTreeMap<u32, (String, ClassRole)>,
}

impl BoundTaxonomy {
    pub fn source(&self) -> DetectorSource {
        self.source
    }

    pub fn role_of(&self, class_id: u32) -> ClassRole {
        self.table
            .get(&class_id)
            .map(|(_, role)| *role)
            .unwrap_or(ClassRole::Unknown)
    }

    /// Normalize one raw detection. Ids missing from the table become `class_<id>`.
    pub fn resolve(&self, raw: &RawDetection) -> Detection {
        let (label, role) = match self.table.get(&raw.class_id) {
            Some((label, role)) => (label.clone(), *role),
            None => (format!("class_{}", raw.class_id), ClassRole::Unknown),
        };
        Detection::new(label, role, raw.confidence, raw.bbox, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn taxonomy(labels: &[&str]) -> ClassTaxonomy {
        labels
            .iter()
            .enumerate()
            .map(|(idx, l)| (idx as u32, l.to_string()))
            .collect()
    }

    #[test]
    fn exact_match_ignores_case() {
        let resolver = TaxonomyPolicy::default_primary().compile().unwrap();
        assert_eq!(resolver.resolve("Fire"), ClassRole::Fire);
        assert_eq!(resolver.resolve("FIRE"), ClassRole::Fire);
        assert_eq!(resolver.resolve("smoke"), ClassRole::Smoke);
        assert_eq!(resolver.resolve("fire_truck"), ClassRole::Unknown);
    }

    #[test]
    fn thermal_aliases_resolve() {
        let resolver = TaxonomyPolicy::default_thermal().compile().unwrap();
        assert_eq!(resolver.resolve("thermal"), ClassRole::Thermal);
        assert_eq!(resolver.resolve("Fire_Thermal"), ClassRole::Thermal);
        assert_eq!(resolver.resolve("fire"), ClassRole::Unknown);
    }

    #[test]
    fn substring_match_on_free_text_labels() {
        let resolver = TaxonomyPolicy::substring()
            .rule(ClassRole::Fire, ["화재"])
            .rule(ClassRole::Smoke, ["연기"])
            .compile()
            .unwrap();
        assert_eq!(resolver.resolve("화재_대형"), ClassRole::Fire);
        assert_eq!(resolver.resolve("흰 연기"), ClassRole::Smoke);
        assert_eq!(resolver.resolve("사람"), ClassRole::Unknown);
    }

    #[test]
    fn first_matching_rule_wins() {
        let resolver = TaxonomyPolicy::substring()
            .rule(ClassRole::Fire, ["fire"])
            .rule(ClassRole::Smoke, ["smoke"])
            .compile()
            .unwrap();
        assert_eq!(resolver.resolve("fire_and_smoke"), ClassRole::Fire);
    }

    #[test]
    fn pattern_match_uses_regex() {
        let resolver = TaxonomyPolicy::pattern()
            .rule(ClassRole::Thermal, [r"^(?i)hot[_-]?spot\d*$"])
            .compile()
            .unwrap();
        assert_eq!(resolver.resolve("HotSpot2"), ClassRole::Thermal);
        assert_eq!(resolver.resolve("not a hotspot"), ClassRole::Unknown);
    }

    #[test]
    fn compile_rejects_bad_rules() {
        assert!(TaxonomyPolicy::exact().compile().is_err());
        assert!(TaxonomyPolicy::exact()
            .rule(ClassRole::Unknown, ["x"])
            .compile()
            .is_err());
        assert!(TaxonomyPolicy::exact()
            .rule(ClassRole::Fire, [" "])
            .compile()
            .is_err());
        assert!(TaxonomyPolicy::pattern()
            .rule(ClassRole::Fire, ["("])
            .compile()
            .is_err());
    }

    #[test]
    fn bind_fails_when_required_role_is_absent() {
        let resolver = TaxonomyPolicy::default_primary().compile().unwrap();
        let err = resolver
            .bind(DetectorSource::Primary, &taxonomy(&["person", "smoke"]))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Fire"), "{msg}");
        assert!(msg.contains("person, smoke"), "{msg}");
    }

    #[test]
    fn bind_fails_when_nothing_resolves() {
        let resolver = TaxonomyPolicy::exact()
            .rule(ClassRole::Thermal, ["thermal"])
            .compile()
            .unwrap();
        assert!(resolver
            .bind(DetectorSource::Thermal, &taxonomy(&["hot", "cold"]))
            .is_err());
    }

    #[test]
    fn bound_taxonomy_resolves_ids() {
        let bound = TaxonomyPolicy::default_primary()
            .compile()
            .unwrap()
            .bind(DetectorSource::Primary, &taxonomy(&["fire", "smoke", "person"]))
            .unwrap();
        assert_eq!(bound.role_of(0), ClassRole::Fire);
        assert_eq!(bound.role_of(2), ClassRole::Unknown);

        let raw = RawDetection {
            class_id: 9,
            confidence: 0.7,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        };
        let det = bound.resolve(&raw);
        assert_eq!(det.class_label(), "class_9");
        assert_eq!(det.class_role(), ClassRole::Unknown);
        assert_eq!(det.source(), DetectorSource::Primary);
    }
}
