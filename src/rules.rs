//! The classification rule table.
//!
//! Every keyword list, priority order, and brand template used by
//! [`attributes::extract`](crate::attributes::extract) and
//! [`grouping::resolve`](crate::grouping::resolve) lives here. Order inside
//! each table is significant: the first matching rule wins.
//!
//! Keywords are matched as substrings of the lowercased listing name.
//! Bump [`RULESET_VERSION`] whenever a change can alter an existing group key,
//! since stored product names were produced by the previous version.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::attributes::{BodySize, LifeStage, PackQuantity, Species};

pub const RULESET_VERSION: u32 = 4;

/// One entry of a keyword table: any keyword present selects `value`.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule<T: 'static> {
    pub keywords: &'static [&'static str],
    pub value: T,
}

/// Names containing any of these are accessories, whatever brand they mention.
pub static ACCESSORY_KEYWORDS: &[&str] = &[
    "brinquedo",
    "mordedor",
    "pelúcia",
    "pelucia",
    "chaveiro",
    "bandana",
    "adesivo",
    "capa para",
    "pingente",
];

pub static SPECIES_RULES: &[KeywordRule<Species>] = &[
    KeywordRule {
        keywords: &["gato", "felino", "cat ", "feline"],
        value: Species::Cat,
    },
    KeywordRule {
        keywords: &["cão", "cães", "cachorro", "dog", "canino"],
        value: Species::Dog,
    },
];

pub static LIFE_STAGE_RULES: &[KeywordRule<LifeStage>] = &[
    KeywordRule {
        keywords: &["filhote", "puppy", "kitten", "junior"],
        value: LifeStage::Puppy,
    },
    KeywordRule {
        keywords: &["senior", "sênior", "idoso", "7+", "mature"],
        value: LifeStage::Senior,
    },
    KeywordRule {
        keywords: &["castrado", "sterili"],
        value: LifeStage::Neutered,
    },
    KeywordRule {
        keywords: &["light", "obeso", "peso"],
        value: LifeStage::Light,
    },
    KeywordRule {
        keywords: &["adult"],
        value: LifeStage::Adult,
    },
];

/// The abbreviated labels used in group keys are keywords too, so a stored
/// key resolves back to itself.
pub static BODY_SIZE_RULES: &[KeywordRule<BodySize>] = &[
    KeywordRule {
        keywords: &["pequeno", "small", "mini", "toy", "peq."],
        value: BodySize::Small,
    },
    KeywordRule {
        keywords: &["médio", "medio", "medium", "méd."],
        value: BodySize::Medium,
    },
    KeywordRule {
        keywords: &["gigante", "giant", "maxi", "gig."],
        value: BodySize::Giant,
    },
    KeywordRule {
        keywords: &["grande", "large", "gde."],
        value: BodySize::Large,
    },
];

/// Flavor terms in priority order: chicken, beef, salmon, lamb, turkey, fish,
/// vegetable, rice.
pub static FLAVOR_RULES: &[KeywordRule<&str>] = &[
    KeywordRule {
        keywords: &["frango"],
        value: "Frango",
    },
    KeywordRule {
        keywords: &["carne"],
        value: "Carne",
    },
    KeywordRule {
        keywords: &["salmão", "salmon"],
        value: "Salmão",
    },
    KeywordRule {
        keywords: &["cordeiro"],
        value: "Cordeiro",
    },
    KeywordRule {
        keywords: &["peru"],
        value: "Peru",
    },
    KeywordRule {
        keywords: &["peixe"],
        value: "Peixe",
    },
    KeywordRule {
        keywords: &["vegetal", "vegetais"],
        value: "Vegetais",
    },
    KeywordRule {
        keywords: &["arroz"],
        value: "Arroz",
    },
];

pub static THREE_PACK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b3\s*uni|\b3\s*tab|\b3\s*comp|cx\s*3\b|pack\s*3\b")
        .expect("valid three-pack pattern")
});

pub static SINGLE_PACK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b1\s*uni|\b1\s*tab|\b1\s*comp|cx\s*1\b|pack\s*1\b")
        .expect("valid single-pack pattern")
});

/// One piece of a brand template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePart {
    /// Fixed text, always emitted.
    Text(&'static str),
    /// The brand line (or the rule's default line).
    Line,
    Flavor,
    LifeStage,
    Size,
    /// `"para Cães"` / `"para Gatos"` when the species is known.
    ForSpecies,
    /// `"1 Comp."` / `"3 Comp."`; a missing quantity renders as a single unit.
    Pack,
}

/// A product line within a brand.
#[derive(Debug, Clone, Copy)]
pub struct LineRule {
    pub keywords: &'static [&'static str],
    pub label: &'static str,
}

/// A brand with a bespoke group-key template.
#[derive(Debug)]
pub struct BrandRule {
    pub triggers: &'static [&'static str],
    /// Brand recorded on newly created products.
    pub brand: &'static str,
    /// Category recorded on newly created products.
    pub category: &'static str,
    pub lines: &'static [LineRule],
    pub default_line: Option<&'static str>,
    pub template: &'static [TemplatePart],
}

impl BrandRule {
    pub fn matches(&self, lower: &str) -> bool {
        self.triggers.iter().any(|t| lower.contains(t))
    }

    pub fn line_for(&self, lower: &str) -> Option<&'static str> {
        self.lines
            .iter()
            .find(|l| l.keywords.iter().any(|k| lower.contains(k)))
            .map(|l| l.label)
            .or(self.default_line)
    }
}

use TemplatePart::{Flavor, ForSpecies, Line, Pack, Size, Text};

pub static BRAND_RULES: &[BrandRule] = &[
    BrandRule {
        triggers: &["nexgard"],
        brand: "NexGard",
        category: "Antipulgas",
        lines: &[LineRule {
            keywords: &["spectra"],
            label: "Spectra",
        }],
        default_line: None,
        template: &[Text("NexGard"), Line, Size, Pack],
    },
    BrandRule {
        triggers: &["bravecto"],
        brand: "Bravecto",
        category: "Antipulgas",
        lines: &[LineRule {
            keywords: &["transdermal", "pipeta", "topico", "tópico"],
            label: "Transdermal",
        }],
        default_line: Some("Mastigável"),
        template: &[Text("Bravecto"), Line, ForSpecies],
    },
    BrandRule {
        triggers: &["simparic"],
        brand: "Simparic",
        category: "Antipulgas",
        lines: &[],
        default_line: None,
        template: &[Text("Simparic"), Pack],
    },
    BrandRule {
        triggers: &["golden"],
        brand: "Golden",
        category: "Ração",
        lines: &[
            LineRule {
                keywords: &["special"],
                label: "Special",
            },
            LineRule {
                keywords: &["formula", "fórmula"],
                label: "Fórmula",
            },
            LineRule {
                keywords: &["selecao", "seleção"],
                label: "Seleção Natural",
            },
            LineRule {
                keywords: &["mega"],
                label: "Mega",
            },
        ],
        default_line: None,
        template: &[
            Text("Ração Golden"),
            Line,
            Flavor,
            TemplatePart::LifeStage,
            Size,
            ForSpecies,
        ],
    },
    BrandRule {
        triggers: &["premier"],
        brand: "Premier",
        category: "Ração",
        lines: &[
            LineRule {
                keywords: &["formula", "fórmula"],
                label: "Fórmula",
            },
            LineRule {
                keywords: &["especifica", "específica", "raça"],
                label: "Raças Específicas",
            },
            LineRule {
                keywords: &["nattu"],
                label: "Nattu",
            },
            LineRule {
                keywords: &["cookie"],
                label: "Cookie",
            },
        ],
        default_line: None,
        template: &[
            Text("Ração Premier"),
            Line,
            Flavor,
            TemplatePart::LifeStage,
            Size,
            ForSpecies,
        ],
    },
    BrandRule {
        triggers: &["royal canin"],
        brand: "Royal Canin",
        category: "Ração",
        lines: &[
            LineRule {
                keywords: &["urinary"],
                label: "Urinary",
            },
            LineRule {
                keywords: &["satiety"],
                label: "Satiety",
            },
            LineRule {
                keywords: &["hypoallergenic"],
                label: "Hypoallergenic",
            },
            LineRule {
                keywords: &["gastro"],
                label: "Gastro",
            },
            LineRule {
                keywords: &["renal"],
                label: "Renal",
            },
            LineRule {
                keywords: &["hepatic"],
                label: "Hepatic",
            },
            LineRule {
                keywords: &["indoor"],
                label: "Indoor",
            },
            LineRule {
                keywords: &["outdoor"],
                label: "Outdoor",
            },
            LineRule {
                keywords: &["fit"],
                label: "Fit",
            },
        ],
        default_line: None,
        template: &[
            Text("Ração Royal Canin"),
            Line,
            TemplatePart::LifeStage,
            Size,
            ForSpecies,
        ],
    },
    BrandRule {
        triggers: &["areia"],
        brand: "Vários",
        category: "Higiene",
        lines: &[
            LineRule {
                keywords: &["viva verde"],
                label: "Viva Verde",
            },
            LineRule {
                keywords: &["pipicat"],
                label: "Pipicat",
            },
        ],
        default_line: Some("Higiênica"),
        template: &[Text("Areia"), Line, Text("para Gatos")],
    },
    BrandRule {
        triggers: &["pedigree"],
        brand: "Pedigree",
        category: "Ração",
        lines: &[],
        default_line: None,
        template: &[
            Text("Ração Pedigree"),
            Flavor,
            TemplatePart::LifeStage,
            Size,
            ForSpecies,
        ],
    },
    BrandRule {
        triggers: &["whiskas"],
        brand: "Whiskas",
        category: "Ração",
        lines: &[],
        default_line: None,
        template: &[
            Text("Ração Whiskas"),
            Flavor,
            TemplatePart::LifeStage,
            Text("para Gatos"),
        ],
    },
];

/// First value whose keyword list has a hit in `lower`.
pub fn first_match<T: Copy>(lower: &str, rules: &[KeywordRule<T>]) -> Option<T> {
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lower.contains(k)))
        .map(|rule| rule.value)
}

pub fn is_accessory(lower: &str) -> bool {
    ACCESSORY_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn brand_rule_for(lower: &str) -> Option<&'static BrandRule> {
    BRAND_RULES.iter().find(|rule| rule.matches(lower))
}

pub fn pack_quantity(lower: &str) -> Option<PackQuantity> {
    if THREE_PACK_PATTERN.is_match(lower) {
        Some(PackQuantity::ThreePack)
    } else if SINGLE_PACK_PATTERN.is_match(lower) {
        Some(PackQuantity::Single)
    } else {
        None
    }
}
