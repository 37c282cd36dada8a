//! load → normalize → aggregate → join → resolve
//!
//! Every run rebuilds all derived state from the two sources. A failure to
//! load either source aborts the run; there is no half-built output.

use crate::analyzer::{attach_scores, count_by_key, merge_aggregates, JoinReport};
use crate::coordinates::CoordinateTable;
use crate::error::{Dataset, PipelineError};
use crate::loader::{extract_properties, extract_services, DatasetLoader, DelimiterMode, SourceSpec, Table};
use crate::models::{normalize_city_key, ColumnMapping, Config, DetailRecord, MunicipalityAggregate};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Municipality-level table, ranked by score
    pub municipalities: Vec<MunicipalityAggregate>,
    /// Property-level table
    pub details: Vec<DetailRecord>,
    pub join: JoinReport,
    pub properties_skipped: usize,
    pub services_skipped: usize,
}

/// Headline figures for a dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_assets: u32,
    pub total_services: u32,
    pub top_city: Option<String>,
    pub top_score: Option<f64>,
}

impl PipelineOutput {
    pub fn summary(&self) -> Summary {
        let top = self.municipalities.first();
        Summary {
            total_assets: self.municipalities.iter().map(|m| m.num_beni).sum(),
            total_services: self.municipalities.iter().map(|m| m.num_servizi).sum(),
            top_city: top.map(|m| m.city_key.clone()),
            top_score: top.map(|m| m.score),
        }
    }

    /// Properties of one municipality, for the detail view.
    pub fn details_for<'a>(&'a self, city_key: &'a str) -> impl Iterator<Item = &'a DetailRecord> + 'a {
        self.details.iter().filter(move |d| d.property.city_key == city_key)
    }
}

pub struct Pipeline {
    loader: DatasetLoader,
    properties_source: SourceSpec,
    services_source: SourceSpec,
    delimiter: DelimiterMode,
    province_filter: Option<String>,
    columns: ColumnMapping,
    coordinates: CoordinateTable,
}

impl Pipeline {
    /// Build from config, reading the coordinate file when one is configured.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let coordinates = match &config.coordinates_file {
            Some(path) => CoordinateTable::load_from_file(path)?,
            None => CoordinateTable::taranto_province(),
        };
        Self::with_coordinates(config, coordinates)
    }

    pub fn with_coordinates(config: &Config, coordinates: CoordinateTable) -> Result<Self, PipelineError> {
        Ok(Self {
            loader: DatasetLoader::with_timeout(Duration::from_secs(config.fetch_timeout_secs)),
            properties_source: config.properties_spec(),
            services_source: config.services_spec(),
            delimiter: config.delimiter_mode()?,
            province_filter: config.province_filter.clone(),
            columns: config.columns.clone(),
            coordinates,
        })
    }

    pub async fn run(&self) -> Result<PipelineOutput, PipelineError> {
        // Services, then properties; either failure aborts the run
        let services = self
            .loader
            .load(&self.services_source, self.delimiter)
            .await
            .map_err(PipelineError::load(Dataset::Services))?;
        let properties = self
            .loader
            .load(&self.properties_source, self.delimiter)
            .await
            .map_err(PipelineError::load(Dataset::Properties))?;

        tracing::info!(
            services = services.len(),
            properties = properties.len(),
            "both sources loaded"
        );

        build_output(
            &properties,
            &services,
            &self.columns,
            self.province_filter.as_deref(),
            &self.coordinates,
        )
    }
}

/// The pure part of a run: everything after both tables are in memory.
pub fn build_output(
    properties: &Table,
    services: &Table,
    columns: &ColumnMapping,
    province_filter: Option<&str>,
    coordinates: &CoordinateTable,
) -> Result<PipelineOutput, PipelineError> {
    // Turn raw rows into records with normalized keys
    let mut property_records = extract_properties(properties, columns).map_err(PipelineError::load(Dataset::Properties))?;
    let service_records = extract_services(services, columns).map_err(PipelineError::load(Dataset::Services))?;

    // Keep only the configured province
    if let Some(province) = province_filter {
        properties
            .require_column(&columns.property_province)
            .map_err(PipelineError::load(Dataset::Properties))?;
        let wanted = normalize_city_key(province);
        let before = property_records.len();
        property_records.retain(|record| normalize_city_key(&record.province) == wanted);
        tracing::info!(province = %wanted, kept = property_records.len(), dropped = before - property_records.len(), "applied province filter");
    }

    // Count per municipality, then join and score
    let assets = count_by_key(property_records.iter().map(|r| r.city_key.as_str()));
    let service_counts = count_by_key(service_records.iter().map(|r| r.city_key.as_str()));

    let mut analysis = merge_aggregates(&assets, &service_counts);
    coordinates.attach(&mut analysis.municipalities);

    // Detail rows reuse the aggregate's score
    let details = attach_scores(&property_records, &analysis.municipalities);

    Ok(PipelineOutput {
        municipalities: analysis.municipalities,
        details,
        join: analysis.join,
        properties_skipped: properties.skipped.len(),
        services_skipped: services.skipped.len(),
    })
}
