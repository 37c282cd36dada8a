//! Social-reuse advisor for a single confiscated property.
//!
//! Classification walks an ordered rule list and stops at the first category
//! whose tokens appear (case-folded substring match) in the property type.

use crate::models::parse_size;

pub const DEFAULT_RESIDENTIAL_THRESHOLD: f64 = 100.0;

/// Size as it arrives from a dataset cell or from a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Size {
    Number(f64),
    Text(String),
}

impl Size {
    /// Unparsable or non-finite sizes count as 0.
    pub fn value(&self) -> f64 {
        let value = match self {
            Size::Number(n) => *n,
            Size::Text(text) => parse_size(text).unwrap_or(0.0),
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }
}

impl From<f64> for Size {
    fn from(value: f64) -> Self {
        Size::Number(value)
    }
}

impl From<u32> for Size {
    fn from(value: u32) -> Self {
        Size::Number(f64::from(value))
    }
}

impl From<&str> for Size {
    fn from(value: &str) -> Self {
        Size::Text(value.to_string())
    }
}

impl From<String> for Size {
    fn from(value: String) -> Self {
        Size::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyCategory {
    Residential,
    Land,
    Storage,
    Commercial,
    Unclassified,
}

pub const LARGE_RESIDENTIAL_SUGGESTIONS: &[&str] = &[
    "Co-housing sociale per famiglie in difficoltà",
    "Comunità alloggio per persone con disabilità",
    "Casa famiglia per minori",
];

pub const SMALL_RESIDENTIAL_SUGGESTIONS: &[&str] = &[
    "Alloggio di emergenza abitativa",
    "Casa rifugio per donne vittime di violenza",
    "Housing temporaneo per persone senza dimora",
];

pub const LAND_SUGGESTIONS: &[&str] = &[
    "Agricoltura sociale con inserimento lavorativo",
    "Parco inclusivo e orti urbani condivisi",
];

pub const STORAGE_SUGGESTIONS: &[&str] = &["Magazzino solidale per banco alimentare ed emporio sociale"];

pub const COMMERCIAL_SUGGESTIONS: &[&str] = &[
    "Laboratorio protetto per l'inserimento lavorativo",
    "Centro di aggregazione e sportello di comunità",
];

pub const FALLBACK_SUGGESTIONS: &[&str] = &["Spazio polifunzionale (previa valutazione tecnica)"];

impl PropertyCategory {
    pub fn suggestions(self, size: f64, residential_threshold: f64) -> &'static [&'static str] {
        match self {
            PropertyCategory::Residential if size > residential_threshold => LARGE_RESIDENTIAL_SUGGESTIONS,
            PropertyCategory::Residential => SMALL_RESIDENTIAL_SUGGESTIONS,
            PropertyCategory::Land => LAND_SUGGESTIONS,
            PropertyCategory::Storage => STORAGE_SUGGESTIONS,
            PropertyCategory::Commercial => COMMERCIAL_SUGGESTIONS,
            PropertyCategory::Unclassified => FALLBACK_SUGGESTIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub category: PropertyCategory,
    /// Lowercase substrings
    pub tokens: Vec<String>,
}

impl Rule {
    pub fn new(category: PropertyCategory, tokens: &[&str]) -> Self {
        Self {
            category,
            tokens: tokens.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    fn matches(&self, folded_type: &str) -> bool {
        self.tokens.iter().any(|token| folded_type.contains(token.as_str()))
    }
}

/// Residential, land, storage, commercial: in that priority.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            PropertyCategory::Residential,
            &["abitazion", "appartament", "villa", "villino", "alloggi", "casa", "residenzial"],
        ),
        Rule::new(
            PropertyCategory::Land,
            &["terren", "agricol", "uliveto", "vigneto", "frutteto", "seminativ", "fondo rustico"],
        ),
        Rule::new(
            PropertyCategory::Storage,
            &["garage", "box", "autorimess", "magazzin", "deposit", "cantina", "posto auto"],
        ),
        Rule::new(
            PropertyCategory::Commercial,
            &["negozi", "commercial", "bottega", "uffici", "laboratori"],
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct Advisor {
    rules: Vec<Rule>,
    residential_threshold: f64,
}

impl Default for Advisor {
    fn default() -> Self {
        Self::new(DEFAULT_RESIDENTIAL_THRESHOLD)
    }
}

impl Advisor {
    pub fn new(residential_threshold: f64) -> Self {
        Self::with_rules(default_rules(), residential_threshold)
    }

    pub fn with_rules(rules: Vec<Rule>, residential_threshold: f64) -> Self {
        Self {
            rules,
            residential_threshold,
        }
    }

    pub fn residential_threshold(&self) -> f64 {
        self.residential_threshold
    }

    pub fn classify(&self, property_type: &str) -> PropertyCategory {
        let folded = property_type.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&folded))
            .map(|rule| rule.category)
            .unwrap_or(PropertyCategory::Unclassified)
    }

    /// Ordered reuse suggestions; never empty.
    pub fn suggest(&self, property_type: &str, size: impl Into<Size>) -> Vec<String> {
        let size = size.into().value();
        self.classify(property_type)
            .suggestions(size, self.residential_threshold)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}
