//! Composite registry (§4.6): several named `CapMatrix` instances composed into a
//! `CapCube` that resolves the best match across the union, plus a directed
//! capability graph over media URNs for path-finding between formats.

use async_trait::async_trait;
use capmux_urn::{best_match, Cap, Urn};
use std::collections::{HashSet, VecDeque};

/// Executes a matched `Cap` on behalf of whichever child `CapMatrix` owns it.
/// Stands in for the plugin/host collaborator that would actually run the
/// capability; kept as a trait so `CapCube` stays decoupled from any one
/// transport.
#[async_trait]
pub trait CapExecutor: Send + Sync {
    async fn execute_cap(&self, cap: &Cap, content_type: &str, payload: &[u8]) -> capmux_wire::Result<Vec<u8>>;
}

/// One named collection of `Cap`s plus the executor that can run them.
/// Registrations are not deduplicated within a matrix: two identical URNs both
/// count, and `matches`/`best_match` just sees the first one in the `Vec`.
pub struct CapMatrix {
    name: String,
    executor: std::sync::Arc<dyn CapExecutor>,
    caps: Vec<Cap>,
}

impl CapMatrix {
    pub fn new(name: impl Into<String>, executor: std::sync::Arc<dyn CapExecutor>) -> Self {
        CapMatrix {
            name: name.into(),
            executor,
            caps: Vec::new(),
        }
    }

    pub fn register(&mut self, cap: Cap) {
        self.caps.push(cap);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The best-specificity match for `request` within this matrix alone.
    pub fn can(&self, request: &Urn) -> Option<&Cap> {
        best_match(&self.caps, |c| &c.urn, request)
    }
}

/// A capability invocation bound to a request URN, not to any one matrix: every
/// call to [`CapCube::execute`] re-resolves the best match at call time, so a
/// matrix registered or deregistered between `can()` and `execute()` is reflected.
pub struct CapCaller {
    request: Urn,
}

impl CapCaller {
    pub fn request(&self) -> &Urn {
        &self.request
    }
}

/// Composes multiple `CapMatrix` instances into one lookup surface.
#[derive(Default)]
pub struct CapCube {
    matrices: Vec<CapMatrix>,
}

impl CapCube {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_matrix(&mut self, matrix: CapMatrix) {
        self.matrices.push(matrix);
    }

    /// Resolves `request` across every child, highest specificity wins, ties
    /// broken by insertion order of the *matrix* (first child registered wins).
    fn resolve(&self, request: &Urn) -> Option<(usize, &Cap)> {
        let mut best: Option<(usize, &Cap, usize)> = None;
        for (matrix_idx, matrix) in self.matrices.iter().enumerate() {
            let Some(cap) = matrix.can(request) else { continue };
            let specificity = cap.urn.specificity();
            match best {
                Some((_, _, best_spec)) if specificity <= best_spec => {}
                _ => best = Some((matrix_idx, cap, specificity)),
            }
        }
        best.map(|(idx, cap, _)| (idx, cap))
    }

    /// `Some` iff at least one child matrix can serve `request` right now.
    pub fn can(&self, request: &Urn) -> Option<CapCaller> {
        self.resolve(request).map(|_| CapCaller { request: request.clone() })
    }

    /// Re-resolves `caller`'s request and forwards execution to the owning
    /// child's executor.
    pub async fn execute(&self, caller: &CapCaller, content_type: &str, payload: &[u8]) -> capmux_wire::Result<Vec<u8>> {
        let Some((matrix_idx, cap)) = self.resolve(&caller.request) else {
            return Err(capmux_wire::Error::protocol(format!(
                "no matrix can currently serve {}",
                caller.request.canonical()
            )));
        };
        self.matrices[matrix_idx].executor.execute_cap(cap, content_type, payload).await
    }
}

/// One edge of the capability graph: a `Cap` connecting its `in` media URN to its
/// `out` media URN, weighted by the cap's own specificity.
struct Edge {
    registry_name: String,
    cap: Cap,
    in_urn: Urn,
    out_urn: Urn,
    weight: usize,
}

/// Basic counts over the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
}

/// A directed graph whose nodes are media URNs and whose edges are capabilities
/// (`in -> out`). Cycles are expected (round-trip conversions); every search
/// below carries a visited set and/or an explicit `max_depth` bound.
#[derive(Default)]
pub struct CapGraph {
    edges: Vec<Edge>,
}

impl CapGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one `cap` as a graph edge, keyed by its `in`/`out` media-URN tags.
    /// Fails (returns without adding) if the cap lacks either tag or they don't
    /// parse as media URNs — the router's own routing never needs a cap without
    /// them (§3.1: `in`/`out` are structurally required).
    pub fn add_cap(&mut self, cap: Cap, registry_name: impl Into<String>) {
        let (Some(in_str), Some(out_str)) = (cap.urn.get("in"), cap.urn.get("out")) else {
            tracing::warn!(cap_urn = %cap.urn, "cap missing in/out tag, not added to capability graph");
            return;
        };
        let (Ok(in_urn), Ok(out_urn)) = (Urn::parse_media(in_str), Urn::parse_media(out_str)) else {
            tracing::warn!(cap_urn = %cap.urn, "cap's in/out tag is not a valid media urn, not added to capability graph");
            return;
        };
        let weight = cap.urn.specificity();
        self.edges.push(Edge {
            registry_name: registry_name.into(),
            cap,
            in_urn,
            out_urn,
            weight,
        });
    }

    /// Edges whose `in` node satisfies `spec` (i.e. accept at least what `spec`
    /// requires), sorted by descending specificity.
    pub fn outgoing(&self, spec: &Urn) -> Vec<&Cap> {
        let mut matches: Vec<&Edge> = self.edges.iter().filter(|e| e.in_urn.satisfies(spec)).collect();
        matches.sort_by(|a, b| b.weight.cmp(&a.weight));
        matches.into_iter().map(|e| &e.cap).collect()
    }

    /// Edges whose `out` node satisfies `spec`, sorted by descending specificity.
    pub fn incoming(&self, spec: &Urn) -> Vec<&Cap> {
        let mut matches: Vec<&Edge> = self.edges.iter().filter(|e| e.out_urn.satisfies(spec)).collect();
        matches.sort_by(|a, b| b.weight.cmp(&a.weight));
        matches.into_iter().map(|e| &e.cap).collect()
    }

    pub fn has_direct_edge(&self, from: &Urn, to: &Urn) -> bool {
        self.edges.iter().any(|e| e.in_urn.satisfies(from) && e.out_urn.satisfies(to))
    }

    /// BFS reachability from `from` to `to`, no depth bound (bounded implicitly by
    /// the finite, visited-tracked edge set).
    pub fn can_convert(&self, from: &Urn, to: &Urn) -> bool {
        self.find_path(from, to).is_some()
    }

    /// Shortest path (by hop count) from `from` to `to`, as the ordered list of
    /// caps to invoke. `None` if unreachable.
    pub fn find_path(&self, from: &Urn, to: &Urn) -> Option<Vec<&Cap>> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from.canonical());
        let mut queue: VecDeque<(Urn, Vec<&Edge>)> = VecDeque::new();
        queue.push_back((from.clone(), Vec::new()));

        while let Some((current, path)) = queue.pop_front() {
            if current.satisfies(to) || to.satisfies(&current) {
                return Some(path.into_iter().map(|e| &e.cap).collect());
            }
            for edge in self.edges.iter().filter(|e| e.in_urn.satisfies(&current)) {
                let key = edge.out_urn.canonical();
                if visited.insert(key) {
                    let mut next_path = path.clone();
                    next_path.push(edge);
                    queue.push_back((edge.out_urn.clone(), next_path));
                }
            }
        }
        None
    }

    /// All simple paths from `from` to `to` up to `max_depth` hops, shortest
    /// first. DFS with a per-path visited set so cycles can't loop forever.
    pub fn find_all_paths(&self, from: &Urn, to: &Urn, max_depth: usize) -> Vec<Vec<&Cap>> {
        let mut results: Vec<Vec<&Edge>> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from.canonical());
        self.dfs_paths(from, to, max_depth, &mut visited, &mut Vec::new(), &mut results);
        results.sort_by_key(|p| p.len());
        results.into_iter().map(|p| p.into_iter().map(|e| &e.cap).collect()).collect()
    }

    #[allow(clippy::only_used_in_recursion)]
    fn dfs_paths<'a>(
        &'a self,
        current: &Urn,
        to: &Urn,
        max_depth: usize,
        visited: &mut HashSet<String>,
        path: &mut Vec<&'a Edge>,
        results: &mut Vec<Vec<&'a Edge>>,
    ) {
        if current.satisfies(to) || to.satisfies(current) {
            if !path.is_empty() {
                results.push(path.clone());
            }
            return;
        }
        if path.len() >= max_depth {
            return;
        }
        for edge in self.edges.iter().filter(|e| e.in_urn.satisfies(current)) {
            let key = edge.out_urn.canonical();
            if visited.insert(key.clone()) {
                path.push(edge);
                self.dfs_paths(&edge.out_urn, to, max_depth, visited, path, results);
                path.pop();
                visited.remove(&key);
            }
        }
    }

    /// The path from `from` to `to` (within `max_depth` hops) whose edge weights
    /// sum highest. Not guaranteed globally optimal beyond `max_depth` (§9).
    pub fn find_best_path(&self, from: &Urn, to: &Urn, max_depth: usize) -> Option<Vec<&Cap>> {
        let mut results: Vec<Vec<&Edge>> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from.canonical());
        self.dfs_paths(from, to, max_depth, &mut visited, &mut Vec::new(), &mut results);
        results
            .into_iter()
            .max_by_key(|path| path.iter().map(|e| e.weight).sum::<usize>())
            .map(|path| path.into_iter().map(|e| &e.cap).collect())
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes: HashSet<String> = HashSet::new();
        for edge in &self.edges {
            nodes.insert(edge.in_urn.canonical());
            nodes.insert(edge.out_urn.canonical());
        }
        GraphStats {
            node_count: nodes.len(),
            edge_count: self.edges.len(),
        }
    }

    /// Every registry name that contributed at least one edge, for diagnostics.
    pub fn registries(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.edges.iter().map(|e| e.registry_name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
