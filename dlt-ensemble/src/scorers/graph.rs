use std::collections::{BTreeMap, HashMap};

use dlt_db::models::{Draw, Pool};
use ndarray::Array1;
use petgraph::algo::dijkstra;
use petgraph::graph::{EdgeReference, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde_json::json;

use super::{check_history, max_normalize, normalize_scores, recent_window, sample_confidence, Scorer, ScorerOutput};
use crate::error::ScorerError;

const DEGREE_WEIGHT: f64 = 0.4;
const BETWEENNESS_WEIGHT: f64 = 0.3;
const CLOSENESS_WEIGHT: f64 = 0.2;
const EIGENVECTOR_WEIGHT: f64 = 0.1;

const POWER_MAX_ITER: usize = 100;
const POWER_TOL: f64 = 1e-6;
const PATH_EPS: f64 = 1e-9;

/// Centrality of each number in the co-occurrence graph of its pool.
/// Edge weight is the number of draws in which both endpoints appeared;
/// path length along an edge is its inverse.
pub struct GraphScorer {
    window: usize,
    min_history: usize,
    fit: Option<GraphFit>,
}

struct GraphFit {
    front: Centrality,
    back: Centrality,
    draws: usize,
}

struct Centrality {
    combined: Vec<f64>,
    edges: usize,
    eigen_converged: bool,
}

impl GraphScorer {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            min_history: 20,
            fit: None,
        }
    }

    pub fn with_min_history(mut self, min_history: usize) -> Self {
        self.min_history = min_history;
        self
    }
}

pub type PoolGraph = UnGraph<u8, f64>;

/// Node `i` holds number `i + 1`; every pool number gets a node even if it
/// never co-occurred with another.
pub fn cooccurrence(draws: &[Draw], pool: Pool) -> PoolGraph {
    let size = pool.size();
    let mut graph = PoolGraph::with_capacity(size, size * (size - 1) / 2);
    let nodes: Vec<NodeIndex> = (1..=size as u8).map(|n| graph.add_node(n)).collect();
    for draw in draws {
        let numbers = pool.numbers_from(draw);
        for (i, &a) in numbers.iter().enumerate() {
            for &b in &numbers[i + 1..] {
                let (a, b) = (nodes[(a - 1) as usize], nodes[(b - 1) as usize]);
                match graph.find_edge(a, b) {
                    Some(edge) => graph[edge] += 1.0,
                    None => {
                        graph.add_edge(a, b, 1.0);
                    }
                }
            }
        }
    }
    graph
}

fn other_end(edge: EdgeReference<'_, f64>, node: NodeIndex) -> NodeIndex {
    if edge.source() == node {
        edge.target()
    } else {
        edge.source()
    }
}

fn path_lengths(graph: &PoolGraph, source: NodeIndex) -> HashMap<NodeIndex, f64> {
    dijkstra(graph, source, None, |e| 1.0 / *e.weight())
}

/// Weighted degree.
pub fn strength(graph: &PoolGraph) -> Vec<f64> {
    graph
        .node_indices()
        .map(|n| graph.edges(n).map(|e| *e.weight()).sum())
        .collect()
}

/// Brandes' algorithm on the weighted graph, undirected pair counting.
/// Shortest-path predecessors are recovered from the Dijkstra distances.
pub fn betweenness(graph: &PoolGraph) -> Vec<f64> {
    let n = graph.node_count();
    let mut centrality = vec![0.0f64; n];

    for s in graph.node_indices() {
        let dist = path_lengths(graph, s);
        let mut order: Vec<NodeIndex> = dist.keys().copied().collect();
        order.sort_by(|a, b| dist[a].total_cmp(&dist[b]).then(a.cmp(b)));

        let mut preds: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        sigma[s.index()] = 1.0;

        for &w in &order {
            if w == s {
                continue;
            }
            for edge in graph.edges(w) {
                let v = other_end(edge, w);
                let Some(&dv) = dist.get(&v) else { continue };
                if (dv + 1.0 / *edge.weight() - dist[&w]).abs() <= PATH_EPS {
                    sigma[w.index()] += sigma[v.index()];
                    preds[w.index()].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        for &w in order.iter().rev() {
            let w = w.index();
            for v in &preds[w] {
                delta[v.index()] += sigma[v.index()] / sigma[w] * (1.0 + delta[w]);
            }
            if w != s.index() {
                centrality[w] += delta[w];
            }
        }
    }

    for c in &mut centrality {
        *c /= 2.0;
    }
    centrality
}

/// Wasserman-Faust closeness, scaled by the reachable fraction so that
/// disconnected components compare fairly.
pub fn closeness(graph: &PoolGraph) -> Vec<f64> {
    let n = graph.node_count();
    if n < 2 {
        return vec![0.0; n];
    }
    graph
        .node_indices()
        .map(|u| {
            let (reachable, total) = path_lengths(graph, u)
                .iter()
                .filter(|&(&v, _)| v != u)
                .fold((0usize, 0.0f64), |(r, t), (_, &d)| (r + 1, t + d));
            if reachable == 0 || total <= 0.0 {
                return 0.0;
            }
            let r = reachable as f64;
            (r / total) * (r / (n - 1) as f64)
        })
        .collect()
}

/// Power iteration on `A + I`, started from the degree vector so isolated
/// numbers stay at zero. None without edges or without convergence.
pub fn eigenvector(graph: &PoolGraph) -> Option<Vec<f64>> {
    let n = graph.node_count();
    if n == 0 || graph.edge_count() == 0 {
        return None;
    }
    let mut x = Array1::from(strength(graph));
    let start_norm = x.dot(&x).sqrt();
    x /= start_norm;

    for _ in 0..POWER_MAX_ITER {
        let mut next = x.clone();
        for edge in graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let w = *edge.weight();
            next[a] += w * x[b];
            next[b] += w * x[a];
        }
        let norm = next.dot(&next).sqrt();
        if norm <= 0.0 || !norm.is_finite() {
            return None;
        }
        next /= norm;
        let change: f64 = next.iter().zip(x.iter()).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        if change < POWER_TOL * n as f64 {
            return Some(x.to_vec());
        }
    }
    None
}

/// Weighted blend of the max-normalized measures. Without an eigenvector
/// the remaining weights are rescaled to sum to one.
fn blend(degree: &[f64], between: &[f64], close: &[f64], eigen: Option<&[f64]>) -> Vec<f64> {
    let total_weight = if eigen.is_some() {
        DEGREE_WEIGHT + BETWEENNESS_WEIGHT + CLOSENESS_WEIGHT + EIGENVECTOR_WEIGHT
    } else {
        DEGREE_WEIGHT + BETWEENNESS_WEIGHT + CLOSENESS_WEIGHT
    };
    (0..degree.len())
        .map(|i| {
            let mut score =
                DEGREE_WEIGHT * degree[i] + BETWEENNESS_WEIGHT * between[i] + CLOSENESS_WEIGHT * close[i];
            if let Some(e) = eigen {
                score += EIGENVECTOR_WEIGHT * e[i];
            }
            score / total_weight
        })
        .collect()
}

fn combine(graph: &PoolGraph) -> Centrality {
    let size = graph.node_count();
    let part = |v: Vec<f64>| max_normalize(v).unwrap_or_else(|| vec![0.0; size]);

    let degree = part(strength(graph));
    let between = part(betweenness(graph));
    let close = part(closeness(graph));
    let eigen = eigenvector(graph).map(part);

    Centrality {
        combined: blend(&degree, &between, &close, eigen.as_deref()),
        edges: graph.edge_count(),
        eigen_converged: eigen.is_some(),
    }
}

impl GraphFit {
    fn confidence(&self) -> f64 {
        let confidence = sample_confidence(0.50, self.draws);
        if self.front.eigen_converged {
            confidence
        } else {
            confidence * 0.9
        }
    }
}

impl Scorer for GraphScorer {
    fn name(&self) -> &str {
        "GraphAssociation"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn train(&mut self, history: &[Draw]) -> Result<(), ScorerError> {
        self.fit = None;
        check_history(self.name(), history, self.min_history)?;
        let draws = recent_window(history, self.window);
        self.fit = Some(GraphFit {
            front: combine(&cooccurrence(draws, Pool::Front)),
            back: combine(&cooccurrence(draws, Pool::Back)),
            draws: draws.len(),
        });
        Ok(())
    }

    fn predict(&self, _history: &[Draw]) -> Result<ScorerOutput, ScorerError> {
        let fit = self
            .fit
            .as_ref()
            .ok_or_else(|| ScorerError::NotTrained(self.name().to_string()))?;

        Ok(ScorerOutput {
            front: normalize_scores(self.name(), Pool::Front, fit.front.combined.clone()),
            back: normalize_scores(self.name(), Pool::Back, fit.back.combined.clone()),
            confidence: fit.confidence(),
            diagnostics: json!({
                "draws": fit.draws,
                "front_edges": fit.front.edges,
                "back_edges": fit.back.edges,
                "front_eigen_converged": fit.front.eigen_converged,
                "back_eigen_converged": fit.back.eigen_converged,
            }),
        })
    }

    fn params(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("window".to_string(), self.window as f64),
            ("degree_weight".to_string(), DEGREE_WEIGHT),
            ("betweenness_weight".to_string(), BETWEENNESS_WEIGHT),
            ("closeness_weight".to_string(), CLOSENESS_WEIGHT),
            ("eigenvector_weight".to_string(), EIGENVECTOR_WEIGHT),
            ("min_history".to_string(), self.min_history as f64),
        ])
    }
}
