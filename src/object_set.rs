//! Object set definitions and the typed handle used to build on them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::aggregations::{
    AggregatableProperties, AggregatableProperty, AggregationOperation, AggregationStep,
    ComputeStep, GroupableProperties, InternalBucketing, MultipleAggregatableProperties,
};
use crate::client::ClientContext;
use crate::error::QueryBuildError;

/// Serializable description of a collection of objects on the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectSetDefinition {
    Base {
        #[serde(rename = "objectType")]
        object_type: String,
    },
    Static {
        objects: Vec<String>,
    },
    Reference {
        reference: String,
    },
    Filter {
        #[serde(rename = "objectSet")]
        object_set: Box<ObjectSetDefinition>,
        #[serde(rename = "where")]
        where_clause: Value,
    },
    Union {
        #[serde(rename = "objectSets")]
        object_sets: Vec<ObjectSetDefinition>,
    },
    Intersect {
        #[serde(rename = "objectSets")]
        object_sets: Vec<ObjectSetDefinition>,
    },
    Subtract {
        #[serde(rename = "objectSets")]
        object_sets: Vec<ObjectSetDefinition>,
    },
    SearchAround {
        #[serde(rename = "objectSet")]
        object_set: Box<ObjectSetDefinition>,
        link: String,
    },
}

impl ObjectSetDefinition {
    pub fn base(object_type: impl Into<String>) -> Self {
        ObjectSetDefinition::Base {
            object_type: object_type.into(),
        }
    }
}

/// An object set bound to a client and to the object type it yields.
#[derive(Debug, Clone)]
pub struct ObjectSet {
    context: ClientContext,
    object_type: String,
    definition: ObjectSetDefinition,
}

impl ObjectSet {
    /// Wraps a caller-owned definition. `object_type` must name the type of
    /// the objects the definition yields.
    pub fn from_definition(
        context: ClientContext,
        object_type: &str,
        definition: ObjectSetDefinition,
    ) -> Result<Self, QueryBuildError> {
        context.ontology().object_type(object_type)?;
        Ok(Self {
            context,
            object_type: object_type.to_string(),
            definition,
        })
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn definition(&self) -> &ObjectSetDefinition {
        &self.definition
    }

    fn derive(&self, object_type: &str, definition: ObjectSetDefinition) -> Self {
        Self {
            context: self.context.clone(),
            object_type: object_type.to_string(),
            definition,
        }
    }

    /// Narrows the set with a service-side `where` clause.
    pub fn filter(&self, where_clause: Value) -> Self {
        self.derive(
            &self.object_type,
            ObjectSetDefinition::Filter {
                object_set: Box::new(self.definition.clone()),
                where_clause,
            },
        )
    }

    pub fn union(&self, others: &[&ObjectSet]) -> Result<Self, QueryBuildError> {
        let object_sets = self.combine(others)?;
        Ok(self.derive(&self.object_type, ObjectSetDefinition::Union { object_sets }))
    }

    pub fn intersect(&self, others: &[&ObjectSet]) -> Result<Self, QueryBuildError> {
        let object_sets = self.combine(others)?;
        Ok(self.derive(&self.object_type, ObjectSetDefinition::Intersect { object_sets }))
    }

    pub fn subtract(&self, others: &[&ObjectSet]) -> Result<Self, QueryBuildError> {
        let object_sets = self.combine(others)?;
        Ok(self.derive(&self.object_type, ObjectSetDefinition::Subtract { object_sets }))
    }

    fn combine(&self, others: &[&ObjectSet]) -> Result<Vec<ObjectSetDefinition>, QueryBuildError> {
        let mut object_sets = Vec::with_capacity(others.len() + 1);
        object_sets.push(self.definition.clone());
        for other in others {
            if other.object_type != self.object_type {
                return Err(QueryBuildError::MismatchedObjectTypes {
                    left: self.object_type.clone(),
                    right: other.object_type.clone(),
                });
            }
            object_sets.push(other.definition.clone());
        }
        Ok(object_sets)
    }

    /// Follows `link` to the linked objects.
    pub fn search_around(&self, link: &str) -> Result<Self, QueryBuildError> {
        let target = self
            .context
            .ontology()
            .object_type(&self.object_type)?
            .link(link)?
            .target_type
            .clone();
        Ok(self.derive(
            &target,
            ObjectSetDefinition::SearchAround {
                object_set: Box::new(self.definition.clone()),
                link: link.to_string(),
            },
        ))
    }

    /// Starts an aggregation over this set.
    pub fn aggregation(&self) -> Result<AggregationStep, QueryBuildError> {
        AggregationStep::new(self.context.clone(), &self.object_type, self.definition.clone())
    }

    pub fn group_by<F>(&self, selector: F) -> Result<AggregationStep, QueryBuildError>
    where
        F: FnOnce(&GroupableProperties) -> Result<InternalBucketing, QueryBuildError>,
    {
        self.aggregation()?.group_by(selector)
    }

    pub fn count(&self) -> Result<ComputeStep, QueryBuildError> {
        Ok(self.aggregation()?.count())
    }

    pub fn min<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.aggregation()?.min(selector)
    }

    pub fn max<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.aggregation()?.max(selector)
    }

    pub fn avg<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.aggregation()?.avg(selector)
    }

    pub fn sum<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.aggregation()?.sum(selector)
    }

    pub fn approximate_distinct<F>(&self, selector: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(&AggregatableProperties) -> Result<AggregatableProperty, QueryBuildError>,
    {
        self.aggregation()?.approximate_distinct(selector)
    }

    /// Batch of named metrics, sent as clauses in name order.
    pub fn aggregate<F>(&self, aggregate_builder: F) -> Result<ComputeStep, QueryBuildError>
    where
        F: FnOnce(
            &MultipleAggregatableProperties,
        ) -> Result<BTreeMap<String, AggregationOperation>, QueryBuildError>,
    {
        self.aggregation()?.aggregate(aggregate_builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{employees, test_client};
    use serde_json::json;

    #[test]
    fn test_definitions_serialize_with_type_tag() {
        let set = employees(&test_client())
            .filter(json!({ "type": "eq", "field": "department", "value": "Eng" }));
        assert_eq!(
            serde_json::to_value(set.definition()).unwrap(),
            json!({
                "type": "filter",
                "objectSet": { "type": "base", "objectType": "Employee" },
                "where": { "type": "eq", "field": "department", "value": "Eng" }
            })
        );
    }

    #[test]
    fn test_filter_leaves_the_source_untouched() {
        let all = employees(&test_client());
        let active = all.filter(json!({ "type": "eq", "field": "isActive", "value": true }));
        assert_eq!(all.definition(), &ObjectSetDefinition::base("Employee"));
        assert_ne!(active.definition(), all.definition());
        assert_eq!(active.object_type(), "Employee");
    }

    #[test]
    fn test_search_around_switches_object_type() {
        let offices = employees(&test_client()).search_around("office").unwrap();
        assert_eq!(offices.object_type(), "Office");
        assert_eq!(
            serde_json::to_value(offices.definition()).unwrap(),
            json!({
                "type": "searchAround",
                "objectSet": { "type": "base", "objectType": "Employee" },
                "link": "office"
            })
        );
        assert!(matches!(
            employees(&test_client()).search_around("manager"),
            Err(QueryBuildError::UnknownLink { .. })
        ));
    }

    #[test]
    fn test_set_operations_require_one_object_type() {
        let client = test_client();
        let department =
            |value: &str| json!({ "type": "eq", "field": "department", "value": value });
        let eng = employees(&client).filter(department("Eng"));
        let ops = employees(&client).filter(department("Ops"));

        let both = eng.union(&[&ops]).unwrap();
        match both.definition() {
            ObjectSetDefinition::Union { object_sets } => assert_eq!(object_sets.len(), 2),
            other => panic!("expected a union, got {:?}", other),
        }
        assert!(eng.subtract(&[&ops]).is_ok());

        let offices = client.objects("Office").unwrap();
        assert!(matches!(
            eng.intersect(&[&offices]),
            Err(QueryBuildError::MismatchedObjectTypes { .. })
        ));
    }

    #[test]
    fn test_definitions_round_trip_from_json() {
        let definition: ObjectSetDefinition = serde_json::from_value(json!({
            "type": "union",
            "objectSets": [
                { "type": "reference", "reference": "ri.object-set.main.versioned-object-set.1" },
                { "type": "static", "objects": ["ri.phonograph2-objects.main.object.1"] }
            ]
        }))
        .unwrap();
        assert!(matches!(
            definition,
            ObjectSetDefinition::Union { ref object_sets } if object_sets.len() == 2
        ));

        let context = test_client().context().clone();
        let wrapped = ObjectSet::from_definition(context, "Employee", definition);
        assert!(wrapped.is_ok());
    }
}
