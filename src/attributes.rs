//! Attribute extraction from free-text listing names.
//!
//! [`extract`] is a pure function of the name: each dimension is resolved
//! independently against its ordered keyword table in [`crate::rules`], and the
//! first hit wins. A dimension with no hit stays `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::rules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Species {
    Dog,
    Cat,
}

impl Species {
    pub fn label(self) -> &'static str {
        match self {
            Species::Dog => "Cães",
            Species::Cat => "Gatos",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifeStage {
    Puppy,
    Senior,
    Adult,
    Neutered,
    Light,
}

impl LifeStage {
    pub fn label(self) -> &'static str {
        match self {
            LifeStage::Puppy => "Filhotes",
            LifeStage::Senior => "Sênior",
            LifeStage::Adult => "Adultos",
            LifeStage::Neutered => "Castrados",
            LifeStage::Light => "Light",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BodySize {
    Small,
    Medium,
    Large,
    Giant,
}

impl BodySize {
    pub fn label(self) -> &'static str {
        match self {
            BodySize::Small => "Peq.",
            BodySize::Medium => "Méd.",
            BodySize::Large => "Gde.",
            BodySize::Giant => "Gig.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackQuantity {
    Single,
    ThreePack,
}

impl PackQuantity {
    pub fn label(self) -> &'static str {
        match self {
            PackQuantity::Single => "1 Comp.",
            PackQuantity::ThreePack => "3 Comp.",
        }
    }
}

/// Structured attributes parsed from one listing name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeSet {
    pub species: Option<Species>,
    pub life_stage: Option<LifeStage>,
    pub body_size: Option<BodySize>,
    pub flavor: Option<String>,
    pub brand_line: Option<String>,
    pub pack_quantity: Option<PackQuantity>,
    /// Set when the input name was empty or blank.
    pub unnamed: bool,
}

impl AttributeSet {
    fn unnamed() -> Self {
        Self {
            unnamed: true,
            ..Self::default()
        }
    }
}

pub fn extract(name: &str) -> AttributeSet {
    if name.trim().is_empty() {
        return AttributeSet::unnamed();
    }
    let lower = name.to_lowercase();
    extract_lower(&lower)
}

/// Same as [`extract`] for a name that is already lowercased and non-empty.
pub(crate) fn extract_lower(lower: &str) -> AttributeSet {
    AttributeSet {
        species: rules::first_match(lower, rules::SPECIES_RULES),
        life_stage: rules::first_match(lower, rules::LIFE_STAGE_RULES),
        body_size: rules::first_match(lower, rules::BODY_SIZE_RULES),
        flavor: rules::first_match(lower, rules::FLAVOR_RULES).map(str::to_string),
        brand_line: rules::brand_rule_for(lower)
            .and_then(|rule| rule.line_for(lower))
            .map(str::to_string),
        pack_quantity: rules::pack_quantity(lower),
        unnamed: false,
    }
}

static WEIGHT_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+[.,]?\d*)\s*(?:a|-|à|ate|até)\s*(\d+[.,]?\d*)\s*kg")
        .expect("valid weight range pattern")
});
static WEIGHT_KG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+[.,]?\d*)\s*kg").expect("valid kg pattern"));
static UNIT_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:un|comp|tab)").expect("valid unit pattern"));
static DOSE_MG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*mg").expect("valid mg pattern"));

/// Short variant label for a listing, used to tell apart sizes of one group.
///
/// Looks for, in order: a weight range (`"2-4kg"`), a single weight
/// (`"15kg"`), a tablet count (`"3 Un."`), then a dose (`"250mg"`). Doses are
/// ignored for antiparasitics sold by weight band.
pub fn weight_label(name: &str) -> Option<String> {
    let lower = name.to_lowercase();

    if let Some(caps) = WEIGHT_RANGE.captures(&lower) {
        return Some(format!("{}-{}kg", &caps[1], &caps[2]));
    }
    if let Some(caps) = WEIGHT_KG.captures(&lower) {
        return Some(format!("{}kg", &caps[1]));
    }
    if lower.contains("comprimido") || lower.contains("tablete") || lower.contains("un") {
        if let Some(caps) = UNIT_COUNT.captures(&lower) {
            return Some(format!("{} Un.", &caps[1]));
        }
    }
    if !lower.contains("bravecto") && !lower.contains("nexgard") {
        if let Some(caps) = DOSE_MG.captures(&lower) {
            return Some(format!("{}mg", &caps[1]));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_every_dimension() {
        let attrs = extract("Ração Golden Special Frango Filhote para Cães Pequeno Porte 15kg");
        assert_eq!(attrs.species, Some(Species::Dog));
        assert_eq!(attrs.life_stage, Some(LifeStage::Puppy));
        assert_eq!(attrs.body_size, Some(BodySize::Small));
        assert_eq!(attrs.flavor.as_deref(), Some("Frango"));
        assert_eq!(attrs.brand_line.as_deref(), Some("Special"));
        assert_eq!(attrs.pack_quantity, None);
        assert!(!attrs.unnamed);
    }

    #[test]
    fn senior_beats_light() {
        let attrs = extract("Ração Premier Light Senior Cães");
        assert_eq!(attrs.life_stage, Some(LifeStage::Senior));
        let attrs = extract("Ração Premier Light Cães Adultos");
        assert_eq!(attrs.life_stage, Some(LifeStage::Light));
    }

    #[test]
    fn first_flavor_in_priority_order_wins() {
        // Salmon appears first in the text, chicken ranks higher.
        let attrs = extract("Ração Salmão e Frango Gatos");
        assert_eq!(attrs.flavor.as_deref(), Some("Frango"));
        assert_eq!(attrs.species, Some(Species::Cat));
    }

    #[test]
    fn cat_checked_before_dog() {
        let attrs = extract("Areia para gatos e cães");
        assert_eq!(attrs.species, Some(Species::Cat));
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(extract("RAÇÃO FILHOTE CÃES"), extract("ração filhote cães"));
    }

    #[test]
    fn empty_name_is_unnamed() {
        let attrs = extract("   ");
        assert!(attrs.unnamed);
        assert_eq!(attrs.species, None);
        assert_eq!(attrs.flavor, None);
    }

    #[test]
    fn unmatched_dimensions_stay_unset() {
        let attrs = extract("Tapete Higiênico Super Absorvente");
        assert_eq!(attrs, AttributeSet::default());
    }

    #[test]
    fn weight_labels() {
        assert_eq!(
            weight_label("Bravecto Cães 10 a 20kg").as_deref(),
            Some("10-20kg")
        );
        assert_eq!(weight_label("NexGard 4,1-10kg").as_deref(), Some("4,1-10kg"));
        assert_eq!(weight_label("Ração Golden 15kg").as_deref(), Some("15kg"));
        assert_eq!(
            weight_label("Vermífugo 4 comprimidos").as_deref(),
            Some("4 Un.")
        );
        assert_eq!(weight_label("Suplemento 500mg").as_deref(), Some("500mg"));
        assert_eq!(weight_label("Tapete Higiênico"), None);
    }
}
