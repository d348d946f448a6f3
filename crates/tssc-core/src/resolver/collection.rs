//! Indexed set of charts available to the resolver

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chart::Chart;
use crate::error::{CoreError, Result};

/// Charts by name, plus the product to chart index. Both are unique.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    charts: BTreeMap<String, Arc<Chart>>,
    products: BTreeMap<String, String>,
}

impl Collection {
    /// Index the charts, rejecting duplicate chart or product names
    pub fn new(charts: impl IntoIterator<Item = Chart>) -> Result<Self> {
        let mut collection = Self::default();
        for chart in charts {
            let name = chart.name().to_string();
            if collection.charts.contains_key(&name) {
                return Err(CoreError::InvalidCollection {
                    message: format!("duplicate chart: {name}"),
                });
            }
            if let Some(product) = chart.product_name() {
                if collection.products.contains_key(product) {
                    return Err(CoreError::InvalidCollection {
                        message: format!("duplicate product name: {product}"),
                    });
                }
                collection
                    .products
                    .insert(product.to_string(), name.clone());
            }
            collection.charts.insert(name, Arc::new(chart));
        }
        Ok(collection)
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Chart>> {
        self.charts
            .get(name)
            .ok_or_else(|| CoreError::ChartNotFound {
                name: name.to_string(),
            })
    }

    /// Chart responsible for the product
    pub fn chart_for_product(&self, product: &str) -> Result<&Arc<Chart>> {
        let name = self
            .products
            .get(product)
            .ok_or_else(|| CoreError::ChartNotFound {
                name: format!("for product {product}"),
            })?;
        self.get(name)
    }

    pub fn depends_on(&self, chart: &Chart) -> Vec<String> {
        chart.depends_on()
    }

    pub fn product_name<'a>(&self, chart: &'a Chart) -> Option<&'a str> {
        chart.product_name()
    }

    /// Charts sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Chart>> {
        self.charts.values()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::test_chart;
    use crate::constants::{DEPENDS_ON_ANNOTATION, PRODUCT_NAME_ANNOTATION};

    #[test]
    fn test_lookups() {
        let collection = Collection::new(vec![
            test_chart("tssc-dh", &[(PRODUCT_NAME_ANNOTATION, "Developer Hub")]),
            test_chart("tssc-openshift", &[]),
            test_chart(
                "tssc-integrations",
                &[(DEPENDS_ON_ANNOTATION, "tssc-dh, tssc-openshift")],
            ),
        ])
        .unwrap();

        assert_eq!(collection.len(), 3);
        assert_eq!(
            collection.chart_for_product("Developer Hub").unwrap().name(),
            "tssc-dh"
        );
        assert!(matches!(
            collection.chart_for_product("Quay"),
            Err(CoreError::ChartNotFound { .. })
        ));
        assert!(matches!(
            collection.get("missing"),
            Err(CoreError::ChartNotFound { .. })
        ));

        let integrations = collection.get("tssc-integrations").unwrap();
        assert_eq!(
            collection.depends_on(integrations),
            vec!["tssc-dh", "tssc-openshift"]
        );
        assert_eq!(collection.product_name(integrations), None);

        let names: Vec<_> = collection.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["tssc-dh", "tssc-integrations", "tssc-openshift"]);
    }

    #[test]
    fn test_duplicate_product() {
        let err = Collection::new(vec![
            test_chart("a", &[(PRODUCT_NAME_ANNOTATION, "Q")]),
            test_chart("b", &[(PRODUCT_NAME_ANNOTATION, "Q")]),
        ])
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCollection { .. }));
    }

    #[test]
    fn test_duplicate_chart() {
        let err = Collection::new(vec![test_chart("a", &[]), test_chart("a", &[])]).unwrap_err();
        assert!(err.to_string().contains("duplicate chart: a"));
    }
}
