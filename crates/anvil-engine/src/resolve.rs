//! Dependency resolution
//!
//! Builds a directed graph over one artifact's actions and turns it into an
//! execution plan of ready groups. Edges come from three places:
//!
//! - `Explicit`: the action's declared dependency set;
//! - `Implicit`: stream order, when an action declares no set at all
//!   (declaring an empty set opts out);
//! - `ShellOrder`: consecutive shell actions, so shell steps keep their
//!   original stream order even where the dependency graph would allow
//!   reordering. Shell-order edges schedule but do not gate: a later shell
//!   still runs when an unrelated earlier shell failed.
//!
//! Cycles are fatal for the whole artifact and reported with the offending
//! id chain; the check runs once at resolve time.

use anvil_action::{ActionId, Artifact};
use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use std::collections::HashMap;

/// Why an edge exists, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    /// Declared in the action's dependency set.
    Explicit,
    /// Implied by stream order.
    Implicit,
    /// Engine rule serializing shell actions among themselves.
    ShellOrder,
}

/// Resolution failures; no action of the artifact executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A declared dependency names an id outside the artifact.
    #[error("action {id} depends on unknown action {dependency}")]
    UnknownDependency {
        /// Action declaring the dependency.
        id: ActionId,
        /// The dangling id.
        dependency: ActionId,
    },

    /// An action declares itself as a dependency.
    #[error("action {id} depends on itself")]
    SelfDependency {
        /// The offending action.
        id: ActionId,
    },

    /// The dependency relation is cyclic.
    #[error("dependency cycle: {}", format_chain(.chain))]
    Cycle {
        /// The offending id chain; first and last entries are the same id.
        chain: Vec<ActionId>,
    },
}

fn format_chain(chain: &[ActionId]) -> String {
    chain
        .iter()
        .map(ActionId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Topologically ordered groups of mutually independent actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    groups: Vec<Vec<ActionId>>,
    dependencies: IndexMap<ActionId, Vec<ActionId>>,
}

impl ExecutionPlan {
    /// Resolve an artifact's actions into an execution plan.
    ///
    /// Determinism: the same artifact always yields the same plan; ties
    /// within a ready group break by original stream order.
    ///
    /// # Errors
    /// [`ResolveError`] when a dependency dangles, is reflexive, or the
    /// graph is cyclic.
    pub fn resolve(artifact: &Artifact) -> Result<Self, ResolveError> {
        let ids: Vec<&ActionId> = artifact.actions.keys().collect();
        let index: HashMap<&ActionId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut graph: DiGraphMap<usize, DepKind> = DiGraphMap::new();
        for i in 0..ids.len() {
            graph.add_node(i);
        }

        for (i, action) in artifact.actions_in_order().enumerate() {
            match &action.dependencies {
                Some(deps) => {
                    for dependency in deps {
                        let j = *index.get(dependency).ok_or_else(|| {
                            ResolveError::UnknownDependency {
                                id: action.id.clone(),
                                dependency: dependency.clone(),
                            }
                        })?;
                        if j == i {
                            return Err(ResolveError::SelfDependency {
                                id: action.id.clone(),
                            });
                        }
                        graph.add_edge(j, i, DepKind::Explicit);
                    }
                }
                None => {
                    if i > 0 {
                        graph.add_edge(i - 1, i, DepKind::Implicit);
                    }
                }
            }
        }

        // Serialize shell actions among themselves in stream order. These
        // edges only schedule, so they must not shadow a real dependency
        // edge between the same pair.
        let shell_indices: Vec<usize> = artifact
            .actions_in_order()
            .enumerate()
            .filter(|(_, a)| a.payload.is_shell())
            .map(|(i, _)| i)
            .collect();
        for pair in shell_indices.windows(2) {
            if !graph.contains_edge(pair[0], pair[1]) {
                graph.add_edge(pair[0], pair[1], DepKind::ShellOrder);
            }
        }

        if let Some(cycle) = find_cycle(ids.len(), &graph) {
            return Err(ResolveError::Cycle {
                chain: cycle.into_iter().map(|i| ids[i].clone()).collect(),
            });
        }

        let groups = layer(ids.len(), &graph)
            .into_iter()
            .map(|group| group.into_iter().map(|i| ids[i].clone()).collect())
            .collect();

        // Gating dependencies: explicit and implicit edges only.
        let mut gating: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
        for (from, to, kind) in graph.all_edges() {
            if !matches!(kind, DepKind::ShellOrder) {
                gating[to].push(from);
            }
        }
        let mut dependencies = IndexMap::new();
        for (i, id) in ids.iter().enumerate() {
            let mut deps = std::mem::take(&mut gating[i]);
            deps.sort_unstable();
            dependencies.insert(
                (*id).clone(),
                deps.into_iter().map(|from| ids[from].clone()).collect(),
            );
        }

        let plan = Self {
            groups,
            dependencies,
        };
        tracing::debug!(
            artifact = %artifact.id,
            actions = ids.len(),
            groups = plan.groups.len(),
            "resolved execution plan"
        );
        Ok(plan)
    }

    /// Ready groups in execution order.
    #[must_use]
    pub fn groups(&self) -> &[Vec<ActionId>] {
        &self.groups
    }

    /// Gating dependencies (explicit + implicit) of one action.
    #[must_use]
    pub fn dependencies_of(&self, id: &ActionId) -> &[ActionId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of planned actions.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.dependencies.len()
    }
}

/// Iterative depth-first search with white/grey/black coloring.
///
/// Returns the cycle as a node chain whose first and last element coincide.
fn find_cycle(n: usize, graph: &DiGraphMap<usize, DepKind>) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    let mut color = vec![Color::White; n];
    let mut path: Vec<usize> = Vec::new();

    for start in 0..n {
        if color[start] != Color::White {
            continue;
        }
        color[start] = Color::Grey;
        path.push(start);
        let mut stack: Vec<(usize, Vec<usize>)> =
            vec![(start, graph.neighbors(start).collect())];

        while let Some((node, neighbors)) = stack.last_mut() {
            if let Some(next) = neighbors.pop() {
                match color[next] {
                    Color::White => {
                        color[next] = Color::Grey;
                        path.push(next);
                        let succ = graph.neighbors(next).collect();
                        stack.push((next, succ));
                    }
                    Color::Grey => {
                        let pos = path.iter().position(|&p| p == next).unwrap_or(0);
                        let mut chain = path[pos..].to_vec();
                        chain.push(next);
                        return Some(chain);
                    }
                    Color::Black => {}
                }
            } else {
                color[*node] = Color::Black;
                path.pop();
                stack.pop();
            }
        }
    }
    None
}

/// Kahn layering: each wave is the set of nodes whose predecessors are all
/// in earlier waves, visited in ascending stream index for determinism.
fn layer(n: usize, graph: &DiGraphMap<usize, DepKind>) -> Vec<Vec<usize>> {
    let mut indegree = vec![0usize; n];
    for (_, to, _) in graph.all_edges() {
        indegree[to] += 1;
    }

    let mut done = vec![false; n];
    let mut remaining = n;
    let mut groups = Vec::new();

    while remaining > 0 {
        let ready: Vec<usize> = (0..n)
            .filter(|&i| !done[i] && indegree[i] == 0)
            .collect();
        debug_assert!(!ready.is_empty(), "cycle slipped past find_cycle");
        if ready.is_empty() {
            break;
        }
        for &i in &ready {
            done[i] = true;
            remaining -= 1;
            for successor in graph.neighbors(i) {
                indegree[successor] -= 1;
            }
        }
        groups.push(ready);
    }
    groups
}
