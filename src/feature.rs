//! GeoJSON-like feature values.
//!
//! The federation engine treats features as opaque payloads: it keys them by
//! id, carries them between layers, and hands them to the merge strategy.
//! Geometry and properties are arbitrary JSON so any backing storage's
//! representation survives federation unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a feature, unique within one logical collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    /// Creates a feature id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FeatureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A stored record: identifier, optional geometry, and free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature identifier.
    pub id: FeatureId,

    /// GeoJSON geometry object, if the feature carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,

    /// Free-form properties object.
    #[serde(default = "default_properties")]
    pub properties: Value,
}

fn default_properties() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Feature {
    /// Creates a feature with no geometry and empty properties.
    pub fn new(id: impl Into<FeatureId>) -> Self {
        Self {
            id: id.into(),
            geometry: None,
            properties: default_properties(),
        }
    }

    /// Sets a GeoJSON point geometry (builder style).
    pub fn with_point(mut self, lon: f64, lat: f64) -> Self {
        self.geometry = Some(serde_json::json!({
            "type": "Point",
            "coordinates": [lon, lat],
        }));
        self
    }

    /// Sets one top-level property (builder style).
    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.properties {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Looks up a property by dotted path, e.g. `"address.city"`.
    pub fn property(&self, path: &str) -> Option<&Value> {
        let mut current = &self.properties;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns `(lon, lat)` when the geometry is a GeoJSON point.
    pub fn point_coordinates(&self) -> Option<(f64, f64)> {
        let geometry = self.geometry.as_ref()?.as_object()?;
        if geometry.get("type")?.as_str()? != "Point" {
            return None;
        }
        let coords = geometry.get("coordinates")?.as_array()?;
        Some((coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_id_display() {
        let id = FeatureId::new("way:4711");
        assert_eq!(format!("{}", id), "way:4711");
        assert_eq!(id.as_str(), "way:4711");
    }

    #[test]
    fn test_feature_property_lookup_by_dotted_path() {
        let feature = Feature::new("f1")
            .with_property("name", "Main St")
            .with_property("address", serde_json::json!({"city": "Berlin"}));

        assert_eq!(
            feature.property("name"),
            Some(&Value::String("Main St".to_string()))
        );
        assert_eq!(
            feature.property("address.city"),
            Some(&Value::String("Berlin".to_string()))
        );
        assert_eq!(feature.property("address.zip"), None);
        assert_eq!(feature.property("missing"), None);
    }

    #[test]
    fn test_point_coordinates() {
        let feature = Feature::new("f1").with_point(13.4, 52.5);
        assert_eq!(feature.point_coordinates(), Some((13.4, 52.5)));

        let bare = Feature::new("f2");
        assert_eq!(bare.point_coordinates(), None);
    }

    #[test]
    fn test_feature_serde_round_trip() {
        let feature = Feature::new("f1").with_point(1.0, 2.0).with_property("k", 7);
        let json = serde_json::to_string(&feature).unwrap();
        let back: Feature = serde_json::from_str(&json).unwrap();
        assert_eq!(back, feature);
    }

    #[test]
    fn test_feature_deserializes_without_properties() {
        let feature: Feature = serde_json::from_str(r#"{"id": "f9"}"#).unwrap();
        assert_eq!(feature.id, FeatureId::new("f9"));
        assert!(feature.properties.as_object().unwrap().is_empty());
    }
}
