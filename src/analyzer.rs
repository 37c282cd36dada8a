use crate::models::{DetailRecord, MunicipalityAggregate, PropertyRecord};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Keys present in only one of the two aggregates. Expected, never an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinReport {
    pub assets_only: Vec<String>,
    pub services_only: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoreAnalysis {
    /// Ranked by score descending, then key
    pub municipalities: Vec<MunicipalityAggregate>,
    pub join: JoinReport,
}

/// Count records per normalized key. Every distinct key is kept.
pub fn count_by_key<'a, I>(keys: I) -> HashMap<String, u32>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: HashMap<String, u32> = HashMap::new();
    for key in keys {
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

/// `round(assets * 10 / (services + 1), 1)`
///
/// The `+ 1` keeps municipalities without any registered service finite
/// while the score still falls as services grow.
pub fn opportunity_score(assets: u32, services: u32) -> f64 {
    let raw = f64::from(assets) * 10.0 / (f64::from(services) + 1.0);
    round_one_decimal(raw)
}

/// One decimal, ties to even: 1.25 -> 1.2, 6.25 -> 6.2.
fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

/// Full outer join of the two aggregates; the missing side counts as zero.
pub fn merge_aggregates(assets: &HashMap<String, u32>, services: &HashMap<String, u32>) -> ScoreAnalysis {
    // Union of both key sets, sorted so the join report is stable
    let keys: BTreeSet<&String> = assets.keys().chain(services.keys()).collect();
    let mut join = JoinReport::default();

    let mut municipalities: Vec<MunicipalityAggregate> = keys
        .into_iter()
        .map(|key| {
            let num_beni = assets.get(key).copied();
            let num_servizi = services.get(key).copied();
            match (num_beni, num_servizi) {
                (Some(_), None) => join.assets_only.push(key.clone()),
                (None, Some(_)) => join.services_only.push(key.clone()),
                _ => {}
            }

            // Zero-fill whichever side is missing
            let num_beni = num_beni.unwrap_or(0);
            let num_servizi = num_servizi.unwrap_or(0);
            MunicipalityAggregate {
                city_key: key.clone(),
                num_beni,
                num_servizi,
                score: opportunity_score(num_beni, num_servizi),
                coordinates: None,
            }
        })
        .collect();

    if !join.assets_only.is_empty() || !join.services_only.is_empty() {
        tracing::debug!(
            assets_only = ?join.assets_only,
            services_only = ?join.services_only,
            "municipalities without a counterpart, zero-filled"
        );
    }

    rank_by_score(&mut municipalities);
    ScoreAnalysis { municipalities, join }
}

/// Highest score first; equal scores fall back to key order so output is stable.
pub fn rank_by_score(municipalities: &mut [MunicipalityAggregate]) {
    municipalities.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.city_key.cmp(&b.city_key))
    });
}

/// Broadcast each municipality's score and service count onto its properties.
///
/// Left join on the normalized key. Scores come only from `municipalities`, so
/// the detail view cannot drift from the map view. Unmatched properties get a
/// zero score and zero services.
pub fn attach_scores(properties: &[PropertyRecord], municipalities: &[MunicipalityAggregate]) -> Vec<DetailRecord> {
    let by_key: HashMap<&str, &MunicipalityAggregate> = municipalities
        .iter()
        .map(|m| (m.city_key.as_str(), m))
        .collect();

    properties
        .iter()
        .map(|property| {
            let (score, num_servizi) = by_key
                .get(property.city_key.as_str())
                .map(|m| (m.score, m.num_servizi))
                .unwrap_or((0.0, 0));
            DetailRecord {
                property: property.clone(),
                score,
                num_servizi,
            }
        })
        .collect()
}
