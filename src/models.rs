use crate::error::ConfigError;
use crate::loader::{DelimiterMode, SourceSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

pub const DEFAULT_SERVICES_URL: &str = "https://dati.puglia.it/ckan/dataset/98118aea-0ec5-40b8-a2c9-944619b9383f/resource/382c8bba-7faa-49c8-803f-678a6f74e75d/download/catalogo-offerta-servizi-disabili-e-anziani.csv";
pub const DEFAULT_PROPERTIES_FILE: &str = "totale__immobili-destinato.csv";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Only properties in this province are scored. `None` keeps every row.
    pub province_filter: Option<String>,
    // Data source configuration: http(s) URLs are fetched, anything else is a path
    pub services_source: String,
    pub properties_source: String,
    /// "auto" or a single delimiter character
    pub delimiter: String,
    pub coordinates_file: Option<String>,
    pub residential_size_threshold: f64,
    pub cache_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub output_directory: Option<String>,
    pub columns: ColumnMapping,
}

/// Header names of the columns the pipeline reads from each dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub property_province: String,
    pub property_municipality: String,
    pub property_address: String,
    pub property_type: String,
    pub property_cadastral_category: String,
    pub property_size: String,
    pub property_purpose: String,
    pub property_recipient: String,
    pub service_municipality: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            property_province: "Provincia".to_string(),
            property_municipality: "Comune".to_string(),
            property_address: "Indirizzo".to_string(),
            property_type: "Tipologia".to_string(),
            property_cadastral_category: "Categoria catastale".to_string(),
            property_size: "Metri quadri/Consistenza".to_string(),
            property_purpose: "Finalità".to_string(),
            property_recipient: "Destinatario".to_string(),
            service_municipality: "COMUNE".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            province_filter: Some("TARANTO".to_string()),
            services_source: DEFAULT_SERVICES_URL.to_string(),
            properties_source: DEFAULT_PROPERTIES_FILE.to_string(),
            delimiter: "auto".to_string(),
            coordinates_file: None,
            residential_size_threshold: 100.0,
            cache_ttl_secs: 3600,
            fetch_timeout_secs: 30,
            output_directory: Some("output".to_string()),
            columns: ColumnMapping::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = file_path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_file(&self, file_path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = file_path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn delimiter_mode(&self) -> Result<DelimiterMode, ConfigError> {
        DelimiterMode::parse(&self.delimiter)
            .ok_or_else(|| ConfigError::Delimiter(self.delimiter.clone()))
    }

    pub fn services_spec(&self) -> SourceSpec {
        SourceSpec::parse(&self.services_source)
    }

    pub fn properties_spec(&self) -> SourceSpec {
        SourceSpec::parse(&self.properties_source)
    }
}

/// One confiscated asset, as read from the properties dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub province: String,
    pub municipality: String,
    pub city_key: String,
    pub address: String,
    pub property_type: String,
    pub cadastral_category: String,
    /// Raw size cell; see [`PropertyRecord::size`]
    pub size_raw: String,
    pub purpose: Option<String>,
    pub recipient: Option<String>,
}

impl PropertyRecord {
    pub fn size(&self) -> Option<f64> {
        parse_size(&self.size_raw)
    }
}

/// One registered social service. Only the municipality takes part in scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub municipality: String,
    pub city_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityAggregate {
    pub city_key: String,
    pub num_beni: u32,
    pub num_servizi: u32,
    pub score: f64,
    /// `None` when the municipality is not in the coordinate table
    pub coordinates: Option<Coordinates>,
}

/// A property with its municipality's score broadcast onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub property: PropertyRecord,
    pub score: f64,
    pub num_servizi: u32,
}

/// Canonical join key for a municipality name: uppercase, surrounding whitespace stripped.
///
/// Accepts anything displayable so numeric or otherwise odd cells still produce a key.
pub fn normalize_city_key<T: fmt::Display + ?Sized>(value: &T) -> String {
    value.to_string().to_uppercase().trim().to_string()
}

/// Missing cells normalize to the empty key, which still joins.
pub fn normalize_optional_city_key(value: Option<&str>) -> String {
    value.map(normalize_city_key::<str>).unwrap_or_default()
}

fn leading_number() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)*)").expect("valid size pattern"))
}

/// "1.200" or "12.345.678", optionally followed by a ",50" decimal part.
fn thousands_grouped() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{1,3}(?:\.\d{3})+(?:,\d+)?$").expect("valid grouping pattern"))
}

/// Italian notation: `,` is the decimal mark and `.` groups thousands.
///
/// A lone `.` not followed by exactly three-digit groups stays a decimal point,
/// so "85.5" is still 85.5.
fn parse_decimal(number: &str) -> Option<f64> {
    let number = if number.contains(',') || thousands_grouped().is_match(number) {
        number.replace('.', "")
    } else {
        number.to_string()
    };
    number
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parse a size cell such as `"120"`, `"85,5"`, `"1.200,50"` or `"120 mq"`.
pub fn parse_size(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    // Whole cell first, then a leading number followed by a unit
    parse_decimal(trimmed).or_else(|| {
        leading_number()
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_decimal(m.as_str()))
    })
}
