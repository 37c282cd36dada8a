//! Static municipality → (lat, lon) lookup.
//!
//! Coverage is extended by editing data, either the built-in table below or a
//! TOML file of `[[municipality]]` entries. Names may repeat; the last entry
//! for a name wins.

use crate::error::CoordinateError;
use crate::models::{normalize_city_key, Coordinates, MunicipalityAggregate};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Taranto province, maintained by hand
const TARANTO_PROVINCE: &[(&str, f64, f64)] = &[
    ("LIZZANO", 40.3906, 17.4475),
    ("GINOSA", 40.5786, 16.7561),
    ("MARTINA FRANCA", 40.7056, 17.3364),
    ("MANDURIA", 40.4011, 17.6339),
    ("TARANTO", 40.4644, 17.2470),
    ("SAN GIORGIO IONICO", 40.4578, 17.3789),
    ("CASTELLANETA", 40.6294, 16.9381),
    ("STATTE", 40.5636, 17.2047),
    ("MASSAFRA", 40.5894, 17.1128),
    ("GROTTAGLIE", 40.5333, 17.4333),
];

#[derive(Debug, Clone, Default)]
pub struct CoordinateTable {
    entries: HashMap<String, Coordinates>,
}

#[derive(Debug, Deserialize)]
struct CoordinateFile {
    #[serde(default)]
    municipality: Vec<CoordinateEntry>,
}

#[derive(Debug, Deserialize)]
struct CoordinateEntry {
    name: String,
    lat: f64,
    lon: f64,
}

impl CoordinateTable {
    /// Build from entries in order. Names are normalized; a later entry for
    /// the same name replaces an earlier one.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Coordinates)>,
        S: AsRef<str>,
    {
        let mut table = HashMap::new();
        for (name, coordinates) in entries {
            table.insert(normalize_city_key(name.as_ref()), coordinates);
        }
        Self { entries: table }
    }

    pub fn taranto_province() -> Self {
        Self::from_entries(
            TARANTO_PROVINCE
                .iter()
                .map(|&(name, lat, lon)| (name, Coordinates { lat, lon })),
        )
    }

    pub fn parse_toml(content: &str, origin: &Path) -> Result<Self, CoordinateError> {
        let file: CoordinateFile = toml::from_str(content).map_err(|source| CoordinateError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Ok(Self::from_entries(file.municipality.into_iter().map(|entry| {
            (entry.name, Coordinates { lat: entry.lat, lon: entry.lon })
        })))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, CoordinateError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CoordinateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse_toml(&content, path)?;
        tracing::info!(path = %path.display(), municipalities = table.len(), "loaded coordinate table");
        Ok(table)
    }

    /// `None` means unresolved; callers must not substitute a default point.
    pub fn resolve(&self, city_key: &str) -> Option<Coordinates> {
        self.entries.get(city_key).copied()
    }

    pub fn attach(&self, municipalities: &mut [MunicipalityAggregate]) {
        for municipality in municipalities.iter_mut() {
            municipality.coordinates = self.resolve(&municipality.city_key);
            if municipality.coordinates.is_none() {
                tracing::debug!(city_key = %municipality.city_key, "no coordinates for municipality");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rows that can be drawn on a map, paired with their coordinates.
pub fn plottable(
    municipalities: &[MunicipalityAggregate],
) -> impl Iterator<Item = (&MunicipalityAggregate, Coordinates)> + '_ {
    municipalities
        .iter()
        .filter_map(|m| m.coordinates.map(|coordinates| (m, coordinates)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn aggregate(city_key: &str) -> MunicipalityAggregate {
        MunicipalityAggregate {
            city_key: city_key.to_string(),
            num_beni: 1,
            num_servizi: 0,
            score: 10.0,
            coordinates: None,
        }
    }

    #[test]
    fn resolves_built_in_municipalities() {
        let table = CoordinateTable::taranto_province();
        assert_eq!(table.len(), 10);
        let lizzano = table.resolve("LIZZANO").unwrap();
        assert_relative_eq!(lizzano.lat, 40.3906);
        assert_relative_eq!(lizzano.lon, 17.4475);
    }

    #[test]
    fn unknown_municipality_is_unresolved() {
        assert_eq!(CoordinateTable::taranto_province().resolve("FAGGIANO"), None);
    }

    #[test]
    fn last_duplicate_entry_wins() {
        let table = CoordinateTable::from_entries([
            ("Statte", Coordinates { lat: 40.50, lon: 17.10 }),
            ("MASSAFRA", Coordinates { lat: 40.5894, lon: 17.1128 }),
            (" STATTE ", Coordinates { lat: 40.5636, lon: 17.2047 }),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("STATTE"), Some(Coordinates { lat: 40.5636, lon: 17.2047 }));
    }

    #[test]
    fn loads_toml_with_duplicates() {
        let content = r#"
            [[municipality]]
            name = "Faggiano"
            lat = 40.40
            lon = 17.38

            [[municipality]]
            name = "FAGGIANO"
            lat = 40.4197
            lon = 17.3881
        "#;
        let table = CoordinateTable::parse_toml(content, Path::new("coords.toml")).unwrap();
        assert_eq!(table.resolve("FAGGIANO"), Some(Coordinates { lat: 40.4197, lon: 17.3881 }));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let err = CoordinateTable::parse_toml("[[municipality]]\nname = 3", Path::new("bad.toml"));
        assert!(matches!(err, Err(CoordinateError::Parse { .. })));
    }

    #[test]
    fn plottable_excludes_unresolved_rows() {
        let table = CoordinateTable::taranto_province();
        let mut rows = vec![aggregate("LIZZANO"), aggregate("FAGGIANO"), aggregate("")];
        table.attach(&mut rows);

        let points: Vec<_> = plottable(&rows).collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].0.city_key, "LIZZANO");
        assert!(points.iter().all(|(_, c)| c.lat != 0.0 && c.lon != 0.0));
        assert_eq!(rows[1].coordinates, None);
    }
}
