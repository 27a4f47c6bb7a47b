//! Auto-layout module for the schema graph
//!
//! Tables are arranged left-to-right in layers so that every relationship points
//! from its owning table towards the table it references:
//!
//! 1. **Cycle breaking**: a depth-first walk in table order reverses back edges
//!    (for ranking only, the output edges keep their direction)
//! 2. **Ranking**: longest path from the sources, sources then pulled next to
//!    their closest successor
//! 3. **Ordering**: edges spanning several ranks get virtual nodes, then
//!    alternating barycenter sweeps reorder each rank, keeping the ordering with
//!    the fewest crossings
//! 4. **Coordinates**: ranks become columns, nodes are stacked inside each column
//!    and columns are centered on a shared horizontal axis
//!
//! Every step iterates in table / relationship order and sorts stably, so the
//! same schema always yields the same graph.

use crate::core::linked::is_linked_table;
use crate::core::schema::{Column, Entity, Relationship, Schema, normalize_table_name};
use petgraph::Directed;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Prefix shown in front of join tables
pub const LINKED_TABLE_LABEL: &str = "[Linked Table]";

/// Graph type: nodes are tables, edges are relationships between stored tables
pub type SchemaGraph = StableGraph<Entity, Relationship, Directed>;

/// Layout configuration
#[derive(Clone, Debug)]
pub struct LayoutConfig {
    /// Width of every table node
    pub node_width: f64,
    /// Height of a table without columns
    pub base_node_height: f64,
    /// Height added per column and per enum member
    pub column_height: f64,
    /// Horizontal gap between ranks
    pub rank_spacing: f64,
    /// Vertical gap between two tables of the same rank
    pub node_spacing: f64,
    /// Vertical gap next to a routed (virtual) edge point
    pub edge_spacing: f64,
    /// Number of barycenter sweeps (alternating direction)
    pub ordering_sweeps: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 400.0,
            base_node_height: 200.0,
            column_height: 20.0,
            rank_spacing: 150.0,
            node_spacing: 50.0,
            edge_spacing: 10.0,
            ordering_sweeps: 8,
        }
    }
}

impl LayoutConfig {
    /// Rendered height of a table: one row per column plus one per enum member
    pub fn node_height(&self, columns: &[Column]) -> f64 {
        let rows: usize = columns.iter().map(|c| 1 + c.enum_key_count()).sum();
        self.base_node_height + rows as f64 * self.column_height
    }

    /// Size reserved for a table while spacing the layers
    pub fn size_hint(&self, table: &Entity) -> (f64, f64) {
        (self.node_width, self.node_height(&table.columns))
    }
}

/// Positioned table
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub display_label: String,
    pub width: f64,
    pub height: f64,
    /// Top-left corner
    pub position: Position,
    pub rank: usize,
    /// Index inside the rank, top to bottom
    pub order: usize,
    pub columns: Vec<Column>,
    pub is_linked_table: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt_suggested_name: Option<String>,
}

/// Top-left corner of a node in graph coordinates
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One relationship drawn as an arrow
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Render-ready graph, recomputed on every schema change
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct LayoutGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl LayoutGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Where the layered layout put a table
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodePlacement {
    pub center: (f64, f64),
    pub rank: usize,
    pub order: usize,
}

/// Result of auto-layout calculation
pub struct LayoutResult {
    pub placements: Vec<(NodeIndex, NodePlacement)>,
}

/// Build the table graph; relationships to unknown tables are left out
///
/// Relationship targets resolve by normalized table name.
pub fn build_schema_graph(schema: &Schema) -> SchemaGraph {
    let mut graph = SchemaGraph::with_capacity(schema.tables.len(), 0);
    let mut by_name: HashMap<String, NodeIndex> = HashMap::new();
    let mut nodes = Vec::with_capacity(schema.tables.len());

    for table in &schema.tables {
        let idx = graph.add_node(table.clone());
        by_name.entry(table.key()).or_insert(idx);
        nodes.push(idx);
    }

    for (table, &source) in schema.tables.iter().zip(&nodes) {
        for relationship in &table.relationships {
            let key = normalize_table_name(&relationship.related_table);
            if let Some(&target) = by_name.get(&key) {
                graph.add_edge(source, target, relationship.clone());
            }
        }
    }

    graph
}

/// Layered layout of the graph, returning the center of every table
pub fn calculate_hierarchical_layout(graph: &SchemaGraph, config: &LayoutConfig) -> LayoutResult {
    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    if nodes.is_empty() {
        return LayoutResult { placements: vec![] };
    }

    let node_to_idx: HashMap<NodeIndex, usize> =
        nodes.iter().enumerate().map(|(i, &n)| (n, i)).collect();

    let edges: Vec<(usize, usize)> = graph
        .edge_references()
        .filter_map(|e| {
            let a = *node_to_idx.get(&e.source())?;
            let b = *node_to_idx.get(&e.target())?;
            (a != b).then_some((a, b))
        })
        .collect();

    let acyclic = break_cycles(nodes.len(), &edges);
    let ranks = assign_ranks(nodes.len(), &acyclic);

    let mut sizes: Vec<(f64, f64)> = nodes
        .iter()
        .map(|&n| config.size_hint(&graph[n]))
        .collect();
    let mut layer_of = ranks.clone();
    let links = insert_virtual_nodes(&acyclic, &mut layer_of, &mut sizes);

    let layer_count = layer_of.iter().max().map_or(0, |r| r + 1);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); layer_count];
    for (id, &layer) in layer_of.iter().enumerate() {
        layers[layer].push(id);
    }

    let layers = order_layers(layers, &links, layer_of.len(), config.ordering_sweeps);
    let centers = assign_coordinates(&layers, &sizes, nodes.len(), config);

    let mut order = vec![0; layer_of.len()];
    for layer in &layers {
        for (i, &id) in layer.iter().enumerate() {
            order[id] = i;
        }
    }

    let placements = nodes
        .iter()
        .enumerate()
        .map(|(i, &node)| {
            (
                node,
                NodePlacement {
                    center: centers[i],
                    rank: ranks[i],
                    order: order[i],
                },
            )
        })
        .collect();

    LayoutResult { placements }
}

/// Lay out a schema with the default configuration
pub fn layout_schema(schema: &Schema) -> LayoutGraph {
    layout_schema_with_config(schema, &LayoutConfig::default())
}

/// Lay out a schema: positioned nodes plus one edge per relationship
pub fn layout_schema_with_config(schema: &Schema, config: &LayoutConfig) -> LayoutGraph {
    let graph = build_schema_graph(schema);
    let result = calculate_hierarchical_layout(&graph, config);

    let nodes = result
        .placements
        .iter()
        .map(|(idx, placement)| {
            let table = &graph[*idx];
            let width = config.node_width;
            let height = config.node_height(&table.columns);
            let is_linked = is_linked_table(table, schema);
            let display_label = if is_linked {
                format!("{} {}", LINKED_TABLE_LABEL, table.table_name)
            } else {
                table.table_name.clone()
            };

            GraphNode {
                id: table.table_name.clone(),
                display_label,
                width,
                height,
                position: Position {
                    x: placement.center.0 - width / 2.0,
                    y: placement.center.1 - height / 2.0,
                },
                rank: placement.rank,
                order: placement.order,
                columns: table.columns.clone(),
                is_linked_table: is_linked,
                gpt_suggested_name: table.gpt_suggested_name.clone(),
            }
        })
        .collect();

    LayoutGraph {
        nodes,
        edges: build_edges(schema),
    }
}

/// One edge per relationship; repeated source/target pairs get a numeric suffix
///
/// A target naming a table of the schema in other casing points at that
/// table's node id. Unresolved targets are kept as written.
fn build_edges(schema: &Schema) -> Vec<GraphEdge> {
    let mut seen: HashMap<(&str, String), usize> = HashMap::new();
    let mut edges = Vec::new();

    for table in &schema.tables {
        for relationship in &table.relationships {
            let target = schema
                .table(&relationship.related_table)
                .map_or(&relationship.related_table, |t| &t.table_name)
                .clone();
            let count = seen
                .entry((table.table_name.as_str(), target.clone()))
                .or_insert(0);
            *count += 1;

            let base = format!("{}-{}", table.table_name, target);
            let id = if *count == 1 {
                base
            } else {
                format!("{}-{}", base, count)
            };

            edges.push(GraphEdge {
                id,
                source: table.table_name.clone(),
                target,
                label: relationship.relationship_type.clone(),
            });
        }
    }

    edges
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Reverse the edges closing a cycle; duplicates are dropped
///
/// Depth-first walk on an explicit stack of (node, next successor) frames.
fn break_cycles(node_count: usize, edges: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut out = vec![Vec::new(); node_count];
    for &(a, b) in edges {
        out[a].push(b);
    }

    let mut state = vec![Visit::New; node_count];
    let mut back = HashSet::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..node_count {
        if state[root] != Visit::New {
            continue;
        }
        state[root] = Visit::Active;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (v, next) = *frame;
            let Some(&w) = out[v].get(next) else {
                state[v] = Visit::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;

            match state[w] {
                Visit::New => {
                    state[w] = Visit::Active;
                    stack.push((w, 0));
                }
                Visit::Active => {
                    back.insert((v, w));
                }
                Visit::Done => {}
            }
        }
    }

    let mut seen = HashSet::new();
    edges
        .iter()
        .map(|&(a, b)| if back.contains(&(a, b)) { (b, a) } else { (a, b) })
        .filter(|edge| seen.insert(*edge))
        .collect()
}

/// Longest-path ranks over an acyclic edge list
fn assign_ranks(node_count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut succs = vec![Vec::new(); node_count];
    let mut indegree = vec![0usize; node_count];
    for &(a, b) in edges {
        succs[a].push(b);
        indegree[b] += 1;
    }

    let mut remaining = indegree.clone();
    let mut queue: VecDeque<usize> = (0..node_count).filter(|&v| indegree[v] == 0).collect();
    let mut topo = Vec::with_capacity(node_count);
    while let Some(v) = queue.pop_front() {
        topo.push(v);
        for &w in &succs[v] {
            remaining[w] -= 1;
            if remaining[w] == 0 {
                queue.push_back(w);
            }
        }
    }

    let mut rank = vec![0usize; node_count];
    for &v in &topo {
        for &w in &succs[v] {
            rank[w] = rank[w].max(rank[v] + 1);
        }
    }

    // Sources sit right before their nearest successor instead of at rank 0
    for &v in &topo {
        if indegree[v] == 0
            && let Some(nearest) = succs[v].iter().map(|&w| rank[w]).min()
        {
            rank[v] = nearest - 1;
        }
    }

    let min = rank.iter().copied().min().unwrap_or(0);
    rank.iter().map(|r| r - min).collect()
}

/// Split edges longer than one rank; returns links between adjacent layers
fn insert_virtual_nodes(
    edges: &[(usize, usize)],
    layer_of: &mut Vec<usize>,
    sizes: &mut Vec<(f64, f64)>,
) -> Vec<(usize, usize)> {
    let mut links = Vec::with_capacity(edges.len());

    for &(a, b) in edges {
        let mut prev = a;
        for layer in layer_of[a] + 1..layer_of[b] {
            let dummy = layer_of.len();
            layer_of.push(layer);
            sizes.push((0.0, 0.0));
            links.push((prev, dummy));
            prev = dummy;
        }
        links.push((prev, b));
    }

    links
}

/// Barycenter sweeps, keeping the best ordering seen
fn order_layers(
    mut layers: Vec<Vec<usize>>,
    links: &[(usize, usize)],
    total: usize,
    sweeps: usize,
) -> Vec<Vec<usize>> {
    let mut preds = vec![Vec::new(); total];
    let mut succs = vec![Vec::new(); total];
    for &(a, b) in links {
        succs[a].push(b);
        preds[b].push(a);
    }

    let mut best = layers.clone();
    let mut best_crossings = count_crossings(&best, links, total);

    for sweep in 0..sweeps {
        if best_crossings == 0 {
            break;
        }

        if sweep % 2 == 0 {
            for layer in 1..layers.len() {
                reorder_layer(&mut layers, layer, layer - 1, &preds);
            }
        } else {
            for layer in (0..layers.len().saturating_sub(1)).rev() {
                reorder_layer(&mut layers, layer, layer + 1, &succs);
            }
        }

        let crossings = count_crossings(&layers, links, total);
        if crossings < best_crossings {
            best = layers.clone();
            best_crossings = crossings;
        }
    }

    best
}

/// Sort one layer by the mean position of its neighbours in the fixed layer
fn reorder_layer(layers: &mut [Vec<usize>], layer: usize, fixed: usize, neighbours: &[Vec<usize>]) {
    let position: HashMap<usize, usize> = layers[fixed]
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect();

    let mut keyed: Vec<(f64, usize)> = layers[layer]
        .iter()
        .enumerate()
        .map(|(i, &id)| {
            let found: Vec<f64> = neighbours[id]
                .iter()
                .filter_map(|n| position.get(n))
                .map(|&p| p as f64)
                .collect();
            let barycenter = if found.is_empty() {
                i as f64
            } else {
                found.iter().sum::<f64>() / found.len() as f64
            };
            (barycenter, id)
        })
        .collect();

    // Stable: equal barycenters keep their current relative order
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    layers[layer] = keyed.into_iter().map(|(_, id)| id).collect();
}

fn count_crossings(layers: &[Vec<usize>], links: &[(usize, usize)], total: usize) -> usize {
    let mut position = vec![0usize; total];
    let mut layer_of = vec![0usize; total];
    for (l, layer) in layers.iter().enumerate() {
        for (i, &id) in layer.iter().enumerate() {
            position[id] = i;
            layer_of[id] = l;
        }
    }

    let mut crossings = 0;
    for (i, &(a1, b1)) in links.iter().enumerate() {
        for &(a2, b2) in &links[i + 1..] {
            if layer_of[a1] != layer_of[a2] {
                continue;
            }
            let (p1, q1) = (position[a1], position[b1]);
            let (p2, q2) = (position[a2], position[b2]);
            if (p1 < p2 && q1 > q2) || (p1 > p2 && q1 < q2) {
                crossings += 1;
            }
        }
    }

    crossings
}

/// Centers for the first `real_count` ids (the tables)
fn assign_coordinates(
    layers: &[Vec<usize>],
    sizes: &[(f64, f64)],
    real_count: usize,
    config: &LayoutConfig,
) -> Vec<(f64, f64)> {
    let is_virtual = |id: usize| id >= real_count;
    let mut centers = vec![(0.0, 0.0); sizes.len()];
    let mut extents = Vec::with_capacity(layers.len());
    let mut x = 0.0;

    for layer in layers {
        let width = layer.iter().map(|&id| sizes[id].0).fold(0.0, f64::max);
        let center_x = x + width / 2.0;
        x += width + config.rank_spacing;

        let mut y = 0.0;
        let mut prev: Option<usize> = None;
        for &id in layer {
            if let Some(p) = prev {
                y += if is_virtual(p) || is_virtual(id) {
                    config.edge_spacing
                } else {
                    config.node_spacing
                };
            }
            let height = sizes[id].1;
            centers[id] = (center_x, y + height / 2.0);
            y += height;
            prev = Some(id);
        }
        extents.push(y);
    }

    let tallest = extents.iter().copied().fold(0.0, f64::max);
    for (layer, extent) in layers.iter().zip(&extents) {
        let shift = (tallest - extent) / 2.0;
        for &id in layer {
            centers[id].1 += shift;
        }
    }

    centers.truncate(real_count);
    centers
}
