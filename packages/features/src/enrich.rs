//! Static per-intersection attributes: centrality, tract demographics,
//! and community area.

use std::collections::{BTreeMap, HashMap};

use crash_hotspots_geography::demographics::TractLookup;
use crash_hotspots_network_models::{NodeCentrality, RoadNode};
use crash_hotspots_spatial::BoundaryIndex;

use crate::aggregate::TemporalAggregates;

/// Community-area number property in the city boundary layer.
pub const COMMUNITY_ID_PROPERTY: &str = "area_numbe";

/// Community-area name property in the city boundary layer.
pub const COMMUNITY_NAME_PROPERTY: &str = "community";

/// Joined attributes for one intersection; `None` is a join miss.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticAttributes {
    pub centrality_degree: Option<f64>,
    pub centrality_closeness: Option<f64>,
    pub centrality_betweenness: Option<f64>,
    pub geoid: Option<String>,
    pub acs_pop: Option<f64>,
    pub acs_median_income: Option<f64>,
    pub acs_households_with_vehicle: Option<f64>,
    pub acs_poverty_universe: Option<f64>,
    pub acs_vehicle_access_rate: Option<f64>,
    pub community_id: Option<String>,
    pub community_name: Option<String>,
}

/// A temporal aggregate row with its static attributes, before imputation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub temporal: TemporalAggregates,
    pub attributes: StaticAttributes,
}

/// Joins static attributes onto intersections.
///
/// Tract and community layers are optional; without them every row
/// misses those joins and is imputed.
pub struct Enricher {
    locations: HashMap<i64, (f64, f64)>,
    centrality: HashMap<i64, NodeCentrality>,
    tracts: Option<TractLookup>,
    communities: Option<BoundaryIndex>,
}

impl Enricher {
    #[must_use]
    pub fn new(
        nodes: &[RoadNode],
        centrality: Vec<NodeCentrality>,
        tracts: Option<TractLookup>,
        communities: Option<BoundaryIndex>,
    ) -> Self {
        Self {
            locations: nodes.iter().map(|n| (n.node_id, (n.lon, n.lat))).collect(),
            centrality: centrality.into_iter().map(|c| (c.node_id, c)).collect(),
            tracts,
            communities,
        }
    }

    /// Attributes of one intersection.
    #[must_use]
    pub fn attributes(&self, node_id: i64) -> StaticAttributes {
        let mut attrs = StaticAttributes::default();

        if let Some(c) = self.centrality.get(&node_id) {
            attrs.centrality_degree = Some(c.degree);
            attrs.centrality_closeness = Some(c.closeness);
            attrs.centrality_betweenness = Some(c.betweenness);
        }

        let Some(&(lon, lat)) = self.locations.get(&node_id) else {
            return attrs;
        };

        if let Some(tracts) = &self.tracts
            && let Some(geoid) = tracts.tract_at(lon, lat)
        {
            if let Some(dem) = tracts.demographics(geoid) {
                attrs.acs_pop = dem.acs_pop;
                attrs.acs_median_income = dem.acs_median_income;
                attrs.acs_households_with_vehicle = dem.acs_households_with_vehicle;
                attrs.acs_poverty_universe = dem.acs_poverty_universe;
                attrs.acs_vehicle_access_rate = dem.acs_vehicle_access_rate;
            }
            attrs.geoid = Some(geoid.to_string());
        }

        if let Some(communities) = &self.communities
            && let Some(area) = communities.lookup(lon, lat)
        {
            attrs.community_id = Some(area.id.clone());
            attrs.community_name = area.name.clone();
        }

        attrs
    }

    /// Attributes for each distinct intersection in `rows`, computed once.
    #[must_use]
    pub fn attributes_for(&self, rows: &[TemporalAggregates]) -> BTreeMap<i64, StaticAttributes> {
        let mut out = BTreeMap::new();
        for row in rows {
            out.entry(row.intersection_id)
                .or_insert_with(|| self.attributes(row.intersection_id));
        }

        let missing_centrality = out
            .values()
            .filter(|a| a.centrality_degree.is_none())
            .count();
        let missing_tract = out.values().filter(|a| a.geoid.is_none()).count();
        let missing_community = out.values().filter(|a| a.community_id.is_none()).count();
        log::info!(
            "Enriched {} intersections ({missing_centrality} without centrality, \
             {missing_tract} outside tracts, {missing_community} outside community areas)",
            out.len()
        );
        out
    }

    /// Pairs every row with its intersection's attributes.
    #[must_use]
    pub fn enrich(&self, rows: Vec<TemporalAggregates>) -> Vec<EnrichedRow> {
        let attributes = self.attributes_for(&rows);
        rows.into_iter()
            .map(|temporal| EnrichedRow {
                attributes: attributes
                    .get(&temporal.intersection_id)
                    .cloned()
                    .unwrap_or_default(),
                temporal,
            })
            .collect()
    }
}
