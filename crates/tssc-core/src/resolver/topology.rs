//! Ordered deployment plan

use std::collections::{BTreeSet, HashMap};
use std::io::{self, Write};
use std::sync::Arc;

use crate::chart::Chart;

/// A chart scheduled for a target namespace
#[derive(Debug, Clone)]
pub struct Dependency {
    chart: Arc<Chart>,
    namespace: String,
}

impl Dependency {
    pub fn new(chart: Arc<Chart>, namespace: impl Into<String>) -> Self {
        Self {
            chart,
            namespace: namespace.into(),
        }
    }

    pub fn chart(&self) -> &Arc<Chart> {
        &self.chart
    }

    pub fn name(&self) -> &str {
        self.chart.name()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Ordered dependencies, chart names are unique
#[derive(Debug, Clone, Default)]
pub struct Topology {
    dependencies: Vec<Dependency>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn into_dependencies(self) -> Vec<Dependency> {
        self.dependencies
    }

    pub fn get(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.dependencies.iter().map(Dependency::name).collect()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Position of the chart in the plan
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.dependencies.iter().position(|d| d.name() == name)
    }

    /// Add to the end, unless already present
    pub fn append(&mut self, dependency: Dependency) {
        if !self.contains(dependency.name()) {
            self.dependencies.push(dependency);
        }
    }

    /// Insert right before `name`, or at the very beginning when `name` is not
    /// present. No-op when the dependency is already present.
    pub fn prepend_before(&mut self, name: &str, dependency: Dependency) {
        if self.contains(dependency.name()) {
            return;
        }
        let index = self.index_of(name).unwrap_or(0);
        self.dependencies.insert(index, dependency);
    }

    /// Insert right after `name`, or at the end when `name` is not present.
    /// No-op when the dependency is already present.
    pub fn append_after(&mut self, name: &str, dependency: Dependency) {
        if self.contains(dependency.name()) {
            return;
        }
        let index = self
            .index_of(name)
            .map(|i| i + 1)
            .unwrap_or(self.dependencies.len());
        self.dependencies.insert(index, dependency);
    }

    /// Reorder so every planned predecessor comes before its dependents,
    /// keeping the current order wherever it already holds. Returns the first
    /// chart left on a cycle, if any.
    pub fn settle(&mut self) -> Option<String> {
        let indices: HashMap<&str, usize> = self
            .dependencies
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name(), i))
            .collect();

        let mut pending = vec![0usize; self.dependencies.len()];
        let mut dependents = vec![Vec::new(); self.dependencies.len()];
        for (i, d) in self.dependencies.iter().enumerate() {
            for predecessor in d.chart().depends_on() {
                if let Some(&p) = indices.get(predecessor.as_str()) {
                    pending[i] += 1;
                    dependents[p].push(i);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..pending.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(pending.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &dependents[i] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < self.dependencies.len() {
            let stuck = (0..pending.len()).find(|&i| pending[i] > 0)?;
            return Some(self.dependencies[stuck].name().to_string());
        }

        let mut slots: Vec<Option<Dependency>> = self.dependencies.drain(..).map(Some).collect();
        self.dependencies = order.into_iter().filter_map(|i| slots[i].take()).collect();
        None
    }

    /// Print as an aligned table: Index, Chart, Namespace, Product, Depends-On
    pub fn print<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut rows = vec![[
            "Index".to_string(),
            "Chart".to_string(),
            "Namespace".to_string(),
            "Product".to_string(),
            "Depends-On".to_string(),
        ]];
        for (i, d) in self.dependencies.iter().enumerate() {
            rows.push([
                format!("{:2}", i + 1),
                d.name().to_string(),
                d.namespace().to_string(),
                d.chart().product_name().unwrap_or_default().to_string(),
                d.chart().depends_on().join(", "),
            ]);
        }

        let mut widths = [0usize; 5];
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        for row in &rows {
            let mut line = String::new();
            for (i, cell) in row.iter().enumerate() {
                if i == row.len() - 1 {
                    line.push_str(cell);
                } else {
                    line.push_str(&format!("{cell:<width$}  ", width = widths[i]));
                }
            }
            writeln!(w, "{}", line.trim_end())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::test_chart;
    use crate::constants::{DEPENDS_ON_ANNOTATION, PRODUCT_NAME_ANNOTATION};

    fn dep(name: &str) -> Dependency {
        Dependency::new(Arc::new(test_chart(name, &[])), "tssc")
    }

    #[test]
    fn test_insertions() {
        let mut t = Topology::new();
        t.append(dep("a"));
        t.append(dep("a"));
        assert_eq!(t.names(), vec!["a"]);

        t.prepend_before("a", dep("b"));
        t.prepend_before("a", dep("c"));
        assert_eq!(t.names(), vec!["b", "c", "a"]);

        t.append_after("b", dep("d"));
        assert_eq!(t.names(), vec!["b", "d", "c", "a"]);

        // Unknown anchors fall back to the edges
        t.prepend_before("missing", dep("e"));
        t.append_after("missing", dep("f"));
        assert_eq!(t.names(), vec!["e", "b", "d", "c", "a", "f"]);

        // Already present, untouched
        t.prepend_before("e", dep("f"));
        assert_eq!(t.len(), 6);
        assert!(t.contains("d"));
        assert_eq!(t.get("c").unwrap().namespace(), "tssc");
    }

    #[test]
    fn test_settle() {
        let needs = |name: &str, predecessors: &str| {
            Dependency::new(
                Arc::new(test_chart(name, &[(DEPENDS_ON_ANNOTATION, predecessors)])),
                "tssc",
            )
        };

        let mut t = Topology::new();
        t.append(dep("a"));
        t.append(needs("f", "z"));
        t.append(needs("e", "a, f"));
        t.append(dep("z"));
        assert_eq!(t.settle(), None);
        assert_eq!(t.names(), vec!["a", "z", "f", "e"]);

        // Already ordered plans stay as they are
        assert_eq!(t.settle(), None);
        assert_eq!(t.names(), vec!["a", "z", "f", "e"]);

        let mut cyclic = Topology::new();
        cyclic.append(needs("x", "y"));
        cyclic.append(needs("y", "x"));
        assert_eq!(cyclic.settle(), Some("x".to_string()));
    }

    #[test]
    fn test_print() {
        let mut t = Topology::new();
        t.append(Dependency::new(
            Arc::new(test_chart("tssc-openshift", &[])),
            "tssc",
        ));
        t.append(Dependency::new(
            Arc::new(test_chart(
                "tssc-dh",
                &[
                    (PRODUCT_NAME_ANNOTATION, "Developer Hub"),
                    (DEPENDS_ON_ANNOTATION, "tssc-openshift"),
                ],
            )),
            "tssc-dh",
        ));

        let mut out = Vec::new();
        t.print(&mut out).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        Index  Chart           Namespace  Product        Depends-On
         1     tssc-openshift  tssc
         2     tssc-dh         tssc-dh    Developer Hub  tssc-openshift
        ");
    }
}
