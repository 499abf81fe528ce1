use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::model::JobConfig;

/// Job dependency graph stored as an arena: jobs are addressed by their
/// declaration index and edges are index lists.
///
/// `depends_on[i]` lists the jobs job `i` waits for; `dependents[i]` is the
/// reverse direction, in declaration order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    /// First declaration wins when a name repeats.
    index: HashMap<String, usize>,
    depends_on: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    dangling: Vec<DanglingDependency>,
}

/// A `depends_on` entry that names no declared job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingDependency {
    /// Declaration index of the job holding the entry.
    pub job: usize,
    /// Position of the entry inside that job's `depends_on`.
    pub position: usize,
    pub name: String,
}

impl DependencyGraph {
    pub fn from_jobs(jobs: &[JobConfig]) -> Self {
        Self::from_entries(
            jobs.iter()
                .map(|job| (job.name.as_str(), job.depends_on.as_slice())),
        )
    }

    /// Build from `(name, dependencies)` pairs in declaration order.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let entries: Vec<_> = entries.into_iter().collect();

        let names: Vec<String> = entries.iter().map(|(name, _)| name.to_string()).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }

        let mut depends_on = vec![Vec::new(); names.len()];
        let mut dependents = vec![Vec::new(); names.len()];
        let mut dangling = Vec::new();
        for (job, (_, deps)) in entries.iter().enumerate() {
            for (position, dep) in deps.iter().enumerate() {
                match index.get(dep.as_str()) {
                    Some(&target) => {
                        depends_on[job].push(target);
                        dependents[target].push(job);
                    }
                    None => dangling.push(DanglingDependency {
                        job,
                        position,
                        name: dep.clone(),
                    }),
                }
            }
        }

        DependencyGraph {
            names,
            index,
            depends_on,
            dependents,
            dangling,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Name at an arena index produced by this graph.
    pub(crate) fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Jobs `name` waits for.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.index_of(name)
            .map(|i| self.depends_on[i].iter().map(|&d| self.name(d)).collect())
            .unwrap_or_default()
    }

    /// Jobs waiting for `name`, in declaration order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.index_of(name)
            .map(|i| self.dependents[i].iter().map(|&d| self.name(d)).collect())
            .unwrap_or_default()
    }

    pub fn dangling(&self) -> &[DanglingDependency] {
        &self.dangling
    }

    /// Find one dependency cycle using an iterative depth-first search.
    ///
    /// Returns the cycle as declaration indices with the first node repeated
    /// at the end, following `depends_on` edges: `[a, b, a]` means `a`
    /// depends on `b` and `b` depends on `a`.
    pub fn find_cycle(&self) -> Option<Vec<usize>> {
        let n = self.names.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];

        for root in 0..n {
            if visited[root] {
                continue;
            }
            // Each frame is (node, index of the next edge to follow).
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            visited[root] = true;
            on_stack[root] = true;

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let Some(&dep) = self.depends_on[node].get(frame.1) else {
                    on_stack[node] = false;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                if on_stack[dep] {
                    let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].iter().map(|&(n, _)| n).collect();
                    cycle.push(dep);
                    return Some(cycle);
                }
                if !visited[dep] {
                    visited[dep] = true;
                    on_stack[dep] = true;
                    stack.push((dep, 0));
                }
            }
        }
        None
    }

    /// [`find_cycle`](Self::find_cycle) with job names instead of indices.
    pub fn find_cycle_names(&self) -> Option<Vec<&str>> {
        self.find_cycle()
            .map(|cycle| cycle.into_iter().map(|i| self.name(i)).collect())
    }

    /// Job name to the jobs that depend on it. Every job has an entry.
    pub fn reverse_mapping(&self) -> BTreeMap<String, Vec<String>> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let dependents = self.dependents[i]
                    .iter()
                    .map(|&d| self.names[d].clone())
                    .collect();
                (name.clone(), dependents)
            })
            .collect()
    }

    /// Dependencies-first execution order, ties broken by declaration order.
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<&str>> {
        let n = self.names.len();
        let mut remaining: Vec<usize> = self.depends_on.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(job) = ready.pop_front() {
            order.push(job);
            for &dependent in &self.dependents[job] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != n {
            return None;
        }
        Some(order.into_iter().map(|i| self.name(i)).collect())
    }

    /// Groups of jobs that can run together: every job sits one layer after
    /// its deepest dependency.
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn execution_layers(&self) -> Option<Vec<Vec<&str>>> {
        let order = self.topological_order()?;
        let mut depth = vec![0usize; self.names.len()];
        for name in &order {
            let Some(i) = self.index_of(name) else {
                continue;
            };
            depth[i] = self.depends_on[i]
                .iter()
                .map(|&d| depth[d] + 1)
                .max()
                .unwrap_or(0);
        }

        let layer_count = depth.iter().max().map_or(0, |d| d + 1);
        let mut layers = vec![Vec::new(); layer_count];
        for (i, &d) in depth.iter().enumerate() {
            layers[d].push(self.name(i));
        }
        Some(layers)
    }
}
