//! `GeoJSON` point layer of intersections for mapping.

use std::collections::HashMap;

use crash_hotspots_analysis_models::{LisaRow, Prediction};
use crash_hotspots_feature_models::FeatureRow;
use crash_hotspots_network_models::RoadNode;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, Value};

/// One point per intersection of `rows` that has a network node.
///
/// Prediction and LISA properties are `null` where the intersection has
/// no prediction or no significant cluster.
#[must_use]
pub fn intersection_layer(
    rows: &[&FeatureRow],
    nodes: &[RoadNode],
    predictions: &[Prediction],
    lisa: &[LisaRow],
) -> FeatureCollection {
    let nodes: HashMap<i64, &RoadNode> = nodes.iter().map(|n| (n.node_id, n)).collect();
    let predictions: HashMap<i64, &Prediction> =
        predictions.iter().map(|p| (p.intersection_id, p)).collect();
    let clusters: HashMap<i64, String> = lisa
        .iter()
        .filter_map(|l| l.cluster.map(|c| (l.intersection_id, c.to_string())))
        .collect();

    let features = rows
        .iter()
        .filter_map(|row| {
            let node = nodes.get(&row.intersection_id)?;
            let prediction = predictions.get(&row.intersection_id);

            let mut properties = JsonObject::new();
            properties.insert("intersection_id".into(), row.intersection_id.into());
            properties.insert("cutoff_date".into(), row.cutoff_date.to_string().into());
            properties.insert("hist_crashes".into(), row.hist_crashes.into());
            properties.insert("label_hotspot".into(), row.label_hotspot.into());
            properties.insert(
                "predicted_probability".into(),
                prediction.map_or(JsonValue::Null, |p| p.predicted_probability.into()),
            );
            properties.insert(
                "predicted_hotspot".into(),
                prediction.map_or(JsonValue::Null, |p| p.predicted_hotspot.into()),
            );
            properties.insert(
                "lisa_cluster".into(),
                clusters
                    .get(&row.intersection_id)
                    .map_or(JsonValue::Null, |c| c.clone().into()),
            );
            properties.insert("community_name".into(), row.community_name.clone().into());

            Some(Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![node.lon, node.lat]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use crash_hotspots_analysis_models::LisaQuadrant;

    use crate::tests::{cutoff, feature_row, fixture_nodes};

    use super::*;

    #[test]
    fn points_carry_prediction_and_cluster() {
        let rows = [
            feature_row(0, cutoff(2), 9, true),
            feature_row(1, cutoff(2), 0, false),
            feature_row(500, cutoff(2), 1, false),
        ];
        let refs: Vec<&FeatureRow> = rows.iter().collect();
        let predictions = [Prediction {
            intersection_id: 0,
            predicted_probability: 0.75,
            predicted_hotspot: 1,
        }];
        let lisa = [LisaRow {
            intersection_id: 0,
            value: 9.0,
            local_i: 2.0,
            quadrant: LisaQuadrant::HighHigh,
            p_value: 0.01,
            cluster: Some(LisaQuadrant::HighHigh),
        }];

        let layer = intersection_layer(&refs, &fixture_nodes(), &predictions, &lisa);
        assert_eq!(layer.features.len(), 2);

        let hot = layer.features[0].properties.as_ref().unwrap();
        assert_eq!(hot["lisa_cluster"], "HH");
        assert_eq!(hot["predicted_hotspot"], 1);
        assert_eq!(hot["cutoff_date"], "2020-12-26");
        assert_eq!(
            layer.features[0].geometry.as_ref().unwrap().value,
            Value::Point(vec![-87.7, 41.88])
        );

        let quiet = layer.features[1].properties.as_ref().unwrap();
        assert!(quiet["lisa_cluster"].is_null());
        assert!(quiet["predicted_probability"].is_null());
    }
}
