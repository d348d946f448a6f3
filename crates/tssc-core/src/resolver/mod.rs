//! Dependency resolution
//!
//! Turns the enabled products of a [`Config`] and the charts of a
//! [`Collection`] into a [`Topology`]: every chart appears once, after all the
//! charts it depends on.

mod collection;
mod topology;

pub use collection::Collection;
pub use topology::{Dependency, Topology};

use std::collections::HashSet;
use std::sync::Arc;

use crate::chart::Chart;
use crate::config::Config;
use crate::error::{CoreError, Result};

/// Resolves the installation order of charts
pub struct Resolver<'a> {
    cfg: &'a Config,
    collection: &'a Collection,
    topology: Topology,
}

impl<'a> Resolver<'a> {
    pub fn new(cfg: &'a Config, collection: &'a Collection) -> Self {
        Self {
            cfg,
            collection,
            topology: Topology::new(),
        }
    }

    /// Resolve the enabled products first, then pull in the shared charts
    /// depending on anything already planned.
    pub fn resolve(mut self) -> Result<Topology> {
        self.resolve_enabled_products()?;
        self.resolve_dependencies()?;
        // Shared charts may pull in predecessors of charts planned later on
        if let Some(chart) = self.topology.settle() {
            return Err(CoreError::CircularDependency { chart });
        }
        tracing::debug!(charts = ?self.topology.names(), "resolved topology");
        Ok(self.topology)
    }

    /// Dependency for a chart. A chart owned by a product, or asking for the
    /// namespace of one, goes to that product's namespace. Product ownership
    /// takes precedence. Anything else goes to the installer namespace.
    fn dependency(&self, chart: &Arc<Chart>) -> Result<Dependency> {
        let product = chart.product_name().or_else(|| chart.use_product_namespace());
        let namespace = match product {
            Some(name) => self.cfg.get_product(name)?.namespace().to_string(),
            None => self.cfg.namespace().to_string(),
        };
        Ok(Dependency::new(Arc::clone(chart), namespace))
    }

    fn resolve_enabled_products(&mut self) -> Result<()> {
        let (cfg, collection) = (self.cfg, self.collection);
        for product in cfg.enabled_products() {
            let chart = collection.chart_for_product(&product.name)?;
            self.topology
                .append(Dependency::new(Arc::clone(chart), product.namespace()));
            self.depends_on(chart, &mut HashSet::new())?;
        }
        Ok(())
    }

    /// Every chart without a product depending on a planned chart lands right
    /// after the last such predecessor in plan order.
    fn resolve_dependencies(&mut self) -> Result<()> {
        let collection = self.collection;
        for chart in collection.iter() {
            if chart.product_name().is_some() {
                continue;
            }
            let Some(required_by) = chart
                .depends_on()
                .into_iter()
                .filter_map(|name| self.topology.index_of(&name).map(|i| (i, name)))
                .max_by_key(|(i, _)| *i)
                .map(|(_, name)| name)
            else {
                continue;
            };

            let dependency = self.dependency(chart)?;
            self.topology.append_after(&required_by, dependency);
            self.depends_on(chart, &mut HashSet::new())?;
        }
        Ok(())
    }

    /// Place the predecessors of `chart` before it, recursively. `visited`
    /// holds the charts on the current path.
    fn depends_on(&mut self, chart: &Arc<Chart>, visited: &mut HashSet<String>) -> Result<()> {
        let name = chart.name().to_string();
        if !visited.insert(name.clone()) {
            return Err(CoreError::CircularDependency { chart: name });
        }

        let collection = self.collection;
        for predecessor in chart.depends_on() {
            let dep_chart = collection.get(&predecessor)?;
            if let Some(product) = dep_chart.product_name() {
                if !self.cfg.get_product(product)?.enabled {
                    tracing::debug!(
                        chart = %name,
                        dependency = %predecessor,
                        product,
                        "skipping dependency owned by a disabled product"
                    );
                    continue;
                }
            }
            let dependency = self.dependency(dep_chart)?;
            self.topology.prepend_before(&name, dependency);
            self.depends_on(dep_chart, visited)?;
        }

        visited.remove(&name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::test_chart;
    use crate::constants::{
        DEPENDS_ON_ANNOTATION, PRODUCT_NAME_ANNOTATION, USE_PRODUCT_NAMESPACE_ANNOTATION,
    };

    fn config(enabled: bool) -> Config {
        Config::from_bytes(
            format!(
                r#"
tssc:
  namespace: inst
  settings: {{}}
  products:
    - name: P
      enabled: {enabled}
      namespace: p-ns
"#
            )
            .as_bytes(),
        )
        .unwrap()
    }

    fn chain() -> Vec<Chart> {
        vec![
            test_chart(
                "A",
                &[(PRODUCT_NAME_ANNOTATION, "P"), (DEPENDS_ON_ANNOTATION, "B,C")],
            ),
            test_chart("B", &[(DEPENDS_ON_ANNOTATION, "D")]),
            test_chart("C", &[]),
            test_chart("D", &[]),
        ]
    }

    fn plan(cfg: &Config, charts: Vec<Chart>) -> Result<Vec<(String, String)>> {
        let collection = Collection::new(charts)?;
        let topology = Resolver::new(cfg, &collection).resolve()?;
        Ok(topology
            .dependencies()
            .iter()
            .map(|d| (d.name().to_string(), d.namespace().to_string()))
            .collect())
    }

    fn names(plan: &[(String, String)]) -> Vec<&str> {
        plan.iter().map(|(name, _)| name.as_str()).collect()
    }

    #[test]
    fn test_enabled_product_with_chain() {
        let plan = plan(&config(true), chain()).unwrap();
        assert_eq!(names(&plan), vec!["D", "B", "C", "A"]);
        for (name, namespace) in &plan {
            let expected = if name == "A" { "p-ns" } else { "inst" };
            assert_eq!(namespace, expected, "namespace of {name}");
        }
    }

    #[test]
    fn test_disabled_product() {
        let plan = plan(&config(false), chain()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_shared_infrastructure() {
        let mut charts = chain();
        charts.push(test_chart("E", &[(DEPENDS_ON_ANNOTATION, "A")]));
        let plan = plan(&config(true), charts).unwrap();
        assert_eq!(names(&plan), vec!["D", "B", "C", "A", "E"]);
        assert_eq!(plan[4].1, "inst");
    }

    #[test]
    fn test_shared_chart_without_planned_predecessor_is_skipped() {
        let mut charts = chain();
        charts.push(test_chart("F", &[(DEPENDS_ON_ANNOTATION, "unknown")]));
        let plan = plan(&config(true), charts).unwrap();
        assert_eq!(names(&plan), vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn test_cycle() {
        let charts = vec![
            test_chart(
                "X",
                &[(PRODUCT_NAME_ANNOTATION, "P"), (DEPENDS_ON_ANNOTATION, "Y")],
            ),
            test_chart("Y", &[(DEPENDS_ON_ANNOTATION, "X")]),
        ];
        let err = plan(&config(true), charts).unwrap_err();
        assert!(matches!(err, CoreError::CircularDependency { .. }));
    }

    #[test]
    fn test_disabled_transitive_skipped() {
        let cfg = Config::from_bytes(
            br#"
tssc:
  namespace: inst
  settings: {}
  products:
    - name: P
      enabled: true
      namespace: p-ns
    - name: Q
      enabled: false
"#,
        )
        .unwrap();
        let charts = vec![
            test_chart(
                "A",
                &[(PRODUCT_NAME_ANNOTATION, "P"), (DEPENDS_ON_ANNOTATION, "Q1, C")],
            ),
            test_chart("Q1", &[(PRODUCT_NAME_ANNOTATION, "Q")]),
            test_chart("C", &[]),
        ];
        let plan = plan(&cfg, charts).unwrap();
        assert_eq!(names(&plan), vec!["C", "A"]);
    }

    #[test]
    fn test_predecessor_namespaces() {
        let cfg = Config::from_bytes(
            br#"
tssc:
  namespace: inst
  settings: {}
  products:
    - name: P
      enabled: true
      namespace: p-ns
    - name: R
      enabled: true
      namespace: r-ns
"#,
        )
        .unwrap();
        let charts = vec![
            test_chart(
                "A",
                &[(PRODUCT_NAME_ANNOTATION, "P"), (DEPENDS_ON_ANNOTATION, "R1, realm")],
            ),
            test_chart("R1", &[(PRODUCT_NAME_ANNOTATION, "R")]),
            test_chart("realm", &[(USE_PRODUCT_NAMESPACE_ANNOTATION, "P")]),
        ];
        let plan = plan(&cfg, charts).unwrap();
        assert_eq!(
            plan,
            vec![
                ("R1".to_string(), "r-ns".to_string()),
                ("realm".to_string(), "p-ns".to_string()),
                ("A".to_string(), "p-ns".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_dependency() {
        let charts = vec![test_chart(
            "A",
            &[(PRODUCT_NAME_ANNOTATION, "P"), (DEPENDS_ON_ANNOTATION, "ghost")],
        )];
        let err = plan(&config(true), charts).unwrap_err();
        assert!(matches!(err, CoreError::ChartNotFound { .. }));
    }

    #[test]
    fn test_missing_product_chart() {
        let err = plan(&config(true), vec![test_chart("C", &[])]).unwrap_err();
        assert!(matches!(err, CoreError::ChartNotFound { .. }));
    }

    #[test]
    fn test_ordering_and_determinism() {
        let mut charts = chain();
        charts.push(test_chart("E", &[(DEPENDS_ON_ANNOTATION, "A, D")]));
        let first = plan(&config(true), charts.clone()).unwrap();
        let second = plan(&config(true), charts.clone()).unwrap();
        assert_eq!(first, second);

        let index = |name: &str| first.iter().position(|(n, _)| n == name).unwrap();
        for chart in &charts {
            for predecessor in chart.depends_on() {
                assert!(index(&predecessor) < index(chart.name()));
            }
        }
    }

    #[test]
    fn test_shared_chart_predecessor_planned_later() {
        let cfg = Config::from_bytes(
            br#"
tssc:
  namespace: inst
  settings: {}
  products:
    - name: P
      enabled: true
      namespace: p-ns
    - name: Q
      enabled: true
      namespace: q-ns
"#,
        )
        .unwrap();
        let charts = vec![
            test_chart("A", &[(PRODUCT_NAME_ANNOTATION, "P")]),
            test_chart("Z", &[(PRODUCT_NAME_ANNOTATION, "Q")]),
            test_chart("E", &[(DEPENDS_ON_ANNOTATION, "A, F")]),
            test_chart("F", &[(DEPENDS_ON_ANNOTATION, "Z")]),
        ];
        let plan = plan(&cfg, charts.clone()).unwrap();
        assert_eq!(names(&plan), vec!["A", "Z", "F", "E"]);

        let index = |name: &str| plan.iter().position(|(n, _)| n == name).unwrap();
        for chart in &charts {
            for predecessor in chart.depends_on() {
                assert!(
                    index(&predecessor) < index(chart.name()),
                    "{predecessor} must precede {}",
                    chart.name()
                );
            }
        }
    }

    #[test]
    fn test_embedded_installer_resolves() {
        let cfs = crate::chartfs::ChartFs::embedded().unwrap();
        let cfg = Config::default_from(&cfs).unwrap();
        let collection = Collection::new(cfs.load_all().unwrap()).unwrap();
        let topology = Resolver::new(&cfg, &collection).resolve().unwrap();
        assert!(!topology.is_empty());
        assert_eq!(topology.names()[0], "tssc-openshift");
    }
}
