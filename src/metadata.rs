//! Generated ontology metadata.
//!
//! The SDK consumes the JSON emitted by the schema generator rather than
//! generating anything itself. Each object type lists its properties with the
//! declared wire type and whether the property is array-valued.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::QueryBuildError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyMetadata {
    pub ontology_rid: String,
    pub ontology_api_name: String,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Full ontology definition: metadata plus every generated object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyDefinition {
    pub metadata: OntologyMetadata,
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectTypeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectTypeDefinition {
    pub api_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub primary_key_type: PropertyType,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,
    #[serde(default)]
    pub links: BTreeMap<String, LinkDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(default)]
    pub multiplicity: bool,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDefinition {
    pub target_type: String,
    #[serde(default)]
    pub multiplicity: bool,
}

/// Declared wire type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyType {
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    String,
    Boolean,
    /// Calendar date without a time component.
    Datetime,
    Timestamp,
    Attachment,
    Geopoint,
    Geoshape,
    NumericTimeseries,
    StringTimeseries,
    #[serde(other)]
    Other,
}

impl PropertyType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PropertyType::Byte
                | PropertyType::Short
                | PropertyType::Integer
                | PropertyType::Long
                | PropertyType::Float
                | PropertyType::Double
                | PropertyType::Decimal
        )
    }

    pub fn is_time_series(self) -> bool {
        matches!(
            self,
            PropertyType::NumericTimeseries | PropertyType::StringTimeseries
        )
    }
}

impl OntologyDefinition {
    /// Parses a generated metadata document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&raw)?)
    }

    pub fn api_name(&self) -> &str {
        &self.metadata.ontology_api_name
    }

    pub fn object_type(&self, api_name: &str) -> Result<&ObjectTypeDefinition, QueryBuildError> {
        self.objects
            .get(api_name)
            .ok_or_else(|| QueryBuildError::UnknownObjectType {
                object_type: api_name.to_string(),
            })
    }
}

impl ObjectTypeDefinition {
    pub fn property(&self, name: &str) -> Result<&PropertyDefinition, QueryBuildError> {
        self.properties
            .get(name)
            .ok_or_else(|| QueryBuildError::UnknownProperty {
                object_type: self.api_name.clone(),
                property: name.to_string(),
            })
    }

    pub fn link(&self, name: &str) -> Result<&LinkDefinition, QueryBuildError> {
        self.links.get(name).ok_or_else(|| QueryBuildError::UnknownLink {
            object_type: self.api_name.clone(),
            link: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONTOLOGY: &str = r#"{
        "metadata": {
            "ontologyRid": "ri.ontology.main.ontology.1",
            "ontologyApiName": "test-ontology"
        },
        "objects": {
            "Employee": {
                "apiName": "Employee",
                "primaryKeyType": "integer",
                "properties": {
                    "id": { "multiplicity": false, "type": "integer", "nullable": false },
                    "skills": { "multiplicity": true, "type": "string" },
                    "badge": { "type": "cipherText" }
                },
                "links": {
                    "office": { "targetType": "Office", "multiplicity": false }
                }
            }
        }
    }"#;

    #[test]
    fn test_parses_generated_metadata() {
        let ontology = OntologyDefinition::from_json(ONTOLOGY).unwrap();
        assert_eq!(ontology.api_name(), "test-ontology");

        let employee = ontology.object_type("Employee").unwrap();
        assert_eq!(employee.primary_key_type, PropertyType::Integer);
        assert!(!employee.property("id").unwrap().nullable);
        assert!(employee.property("skills").unwrap().multiplicity);
        assert!(employee.property("skills").unwrap().nullable);
        assert_eq!(employee.link("office").unwrap().target_type, "Office");
    }

    #[test]
    fn test_unrecognized_property_type_is_other() {
        let ontology = OntologyDefinition::from_json(ONTOLOGY).unwrap();
        let badge = ontology.object_type("Employee").unwrap().property("badge").unwrap();
        assert_eq!(badge.property_type, PropertyType::Other);
    }

    #[test]
    fn test_lookup_errors_name_the_missing_item() {
        let ontology = OntologyDefinition::from_json(ONTOLOGY).unwrap();
        let err = ontology.object_type("Office").unwrap_err();
        assert_eq!(err.to_string(), "object type `Office` is not defined in the ontology");

        let employee = ontology.object_type("Employee").unwrap();
        assert!(matches!(
            employee.property("salary"),
            Err(QueryBuildError::UnknownProperty { property, .. }) if property == "salary"
        ));
        assert!(employee.link("manager").is_err());
    }
}
