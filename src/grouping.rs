//! Group key resolution.
//!
//! [`resolve`] maps a raw listing name to the key of the canonical product it
//! belongs to. The cascade is:
//!
//! 1. accessory blacklist, which short-circuits everything else;
//! 2. the first matching brand template from [`rules::BRAND_RULES`];
//! 3. a generic fallback that strips weight tokens and title-cases the rest.
//!
//! The result depends only on the name and [`rules::RULESET_VERSION`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::attributes::{self, AttributeSet, PackQuantity};
use crate::rules::{self, BrandRule, TemplatePart};

/// Key shared by every accessory, toy, or other non-edible listing.
pub const ACCESSORIES_GROUP: &str = "Accessories";

/// Key for listings with an empty name.
pub const NO_NAME_GROUP: &str = "Produto Sem Nome";

/// Residual names shorter than this fall back to the full collapsed name.
const MIN_FALLBACK_LEN: usize = 10;

static KG_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+[.,]?\d*\s*kg").expect("valid kg token pattern"));
static GRAM_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\d+[.,]?\d*\s*g\b").expect("valid gram token pattern"));

/// Canonical identity of a product family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_accessory(&self) -> bool {
        self.0 == ACCESSORIES_GROUP
    }

    pub fn is_unnamed(&self) -> bool {
        self.0 == NO_NAME_GROUP
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which step of the cascade produced a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSource {
    Unnamed,
    Accessory,
    Brand,
    Generic,
}

/// Full classification of a listing name.
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub key: GroupKey,
    pub source: GroupSource,
    /// Brand and category from the matched brand rule, if any.
    pub brand: Option<&'static str>,
    pub category: Option<&'static str>,
    pub attributes: AttributeSet,
}

pub fn resolve(name: &str) -> GroupKey {
    classify(name).key
}

pub fn classify(name: &str) -> Classification {
    if name.trim().is_empty() {
        return Classification {
            key: GroupKey(NO_NAME_GROUP.to_string()),
            source: GroupSource::Unnamed,
            brand: None,
            category: None,
            attributes: attributes::extract(name),
        };
    }

    let lower = name.to_lowercase();
    let attrs = attributes::extract_lower(&lower);

    if rules::is_accessory(&lower) {
        return Classification {
            key: GroupKey(ACCESSORIES_GROUP.to_string()),
            source: GroupSource::Accessory,
            brand: None,
            category: None,
            attributes: attrs,
        };
    }

    if let Some(rule) = rules::brand_rule_for(&lower) {
        return Classification {
            key: GroupKey(render_template(rule, &attrs)),
            source: GroupSource::Brand,
            brand: Some(rule.brand),
            category: Some(rule.category),
            attributes: attrs,
        };
    }

    Classification {
        key: GroupKey(generic_key(name)),
        source: GroupSource::Generic,
        brand: None,
        category: None,
        attributes: attrs,
    }
}

fn render_template(rule: &BrandRule, attrs: &AttributeSet) -> String {
    let parts: Vec<String> = rule
        .template
        .iter()
        .filter_map(|part| match part {
            TemplatePart::Text(text) => Some((*text).to_string()),
            TemplatePart::Line => attrs.brand_line.clone(),
            TemplatePart::Flavor => attrs.flavor.clone(),
            TemplatePart::LifeStage => attrs.life_stage.map(|s| s.label().to_string()),
            TemplatePart::Size => attrs.body_size.map(|s| s.label().to_string()),
            TemplatePart::ForSpecies => attrs.species.map(|s| format!("para {}", s.label())),
            TemplatePart::Pack => Some(
                attrs
                    .pack_quantity
                    .unwrap_or(PackQuantity::Single)
                    .label()
                    .to_string(),
            ),
        })
        .collect();
    join_words(parts.iter().map(String::as_str))
}

fn generic_key(name: &str) -> String {
    let stripped = KG_TOKEN.replace_all(name, " ");
    let stripped = GRAM_TOKEN.replace_all(&stripped, " ");
    let mut residual = collapse_whitespace(&stripped);
    if residual.chars().count() < MIN_FALLBACK_LEN {
        residual = collapse_whitespace(name);
    }
    title_case(&residual)
}

/// Joins non-empty fragments with single spaces.
fn join_words<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    collapse_whitespace(&parts.collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
