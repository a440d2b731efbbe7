//! Typed dependency inference and graph statistics.
//!
//! Edges are value triples in a flat list; traversal happens over index
//! maps built once per snapshot. Cycle handling is an iterative
//! three-colour depth-first walk - no recursion, no owning references
//! between resources.

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::{DependencyReport, GraphStats};
use domain_inventory::{Dependency, RelationshipKind, Resource};

/// Confidence for edges whose target is not present in the snapshot.
const UNRESOLVED_CONFIDENCE: f64 = 0.7;

/// Confidence for heuristic same-stack grouping edges.
const SAME_STACK_CONFIDENCE: f64 = 0.4;

/// Default cap on counted simple cycles.
const DEFAULT_CYCLE_CAP: usize = 100;

/// Relationship extractors, matched per resource.
struct ExtractionRule {
    applies: fn(&Resource) -> bool,
    keys: &'static [&'static str],
    relationship: RelationshipKind,
}

fn is_compute_instance(r: &Resource) -> bool {
    matches!(r.service.as_str(), "ec2" | "compute" | "vm")
        || r.resource_type.contains("instance")
        || r.resource_type == "vm"
}

fn is_database(r: &Resource) -> bool {
    matches!(r.service.as_str(), "rds" | "cloudsql" | "sql" | "cosmosdb" | "dynamodb")
        || r.resource_type.contains("database")
        || r.resource_type.contains("db_instance")
}

fn is_function(r: &Resource) -> bool {
    matches!(r.service.as_str(), "lambda" | "functions" | "cloudfunctions")
        || r.resource_type.contains("function")
}

fn is_load_balancer(r: &Resource) -> bool {
    r.resource_type.contains("load_balancer") || r.service.contains("elb")
}

fn is_queue_or_topic(r: &Resource) -> bool {
    matches!(r.service.as_str(), "sqs" | "sns" | "pubsub" | "servicebus")
        || r.resource_type.contains("queue")
        || r.resource_type.contains("topic")
}

fn is_volume(r: &Resource) -> bool {
    r.resource_type.contains("volume") || r.resource_type.contains("disk")
}

const EXTRACTION_RULES: &[ExtractionRule] = &[
    ExtractionRule {
        applies: is_compute_instance,
        keys: &["security_groups", "security_group_ids"],
        relationship: RelationshipKind::UsesSecurityGroup,
    },
    ExtractionRule {
        applies: is_compute_instance,
        keys: &["vpc_id", "network"],
        relationship: RelationshipKind::RunsInVpc,
    },
    ExtractionRule {
        applies: is_database,
        keys: &["db_subnet_group", "subnet_group"],
        relationship: RelationshipKind::UsesSubnetGroup,
    },
    ExtractionRule {
        applies: is_database,
        keys: &["security_groups", "vpc_security_group_ids"],
        relationship: RelationshipKind::UsesSecurityGroup,
    },
    ExtractionRule {
        applies: is_function,
        keys: &["role", "service_account"],
        relationship: RelationshipKind::UsesRole,
    },
    ExtractionRule {
        applies: is_function,
        keys: &["event_sources", "triggers"],
        relationship: RelationshipKind::TriggeredBy,
    },
    ExtractionRule {
        applies: is_load_balancer,
        keys: &["targets", "backends", "target_groups"],
        relationship: RelationshipKind::Targets,
    },
    ExtractionRule {
        applies: is_load_balancer,
        keys: &["security_groups"],
        relationship: RelationshipKind::UsesSecurityGroup,
    },
    ExtractionRule {
        applies: is_queue_or_topic,
        keys: &["subscriptions", "subscribers"],
        relationship: RelationshipKind::SubscribedBy,
    },
    ExtractionRule {
        applies: is_volume,
        keys: &["attached_to", "instance_id"],
        relationship: RelationshipKind::AttachedTo,
    },
];

/// Pull string references out of a configuration value: a plain string, an
/// array of strings, or an array of objects carrying `arn`/`id`.
fn string_refs(configuration: &JsonValue, key: &str) -> Vec<String> {
    match configuration.get(key) {
        Some(JsonValue::String(s)) if !s.is_empty() => vec![s.clone()],
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
                JsonValue::Object(obj) => obj
                    .get("arn")
                    .or_else(|| obj.get("id"))
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Lookup of snapshot members by both provider-local id and ARN.
struct ResourceIndex {
    canonical: HashMap<String, String>,
}

impl ResourceIndex {
    fn build(resources: &[Resource]) -> Self {
        let mut canonical = HashMap::new();
        for resource in resources {
            let key = resource.relationship_key();
            canonical.insert(resource.id.clone(), key.clone());
            if let Some(arn) = &resource.arn {
                canonical.insert(arn.clone(), key.clone());
            }
            canonical.insert(key.clone(), key);
        }
        Self { canonical }
    }

    /// Resolve a raw reference. Unresolved references keep the raw text as
    /// the target so nothing silently disappears.
    fn resolve(&self, raw: &str) -> (String, bool) {
        match self.canonical.get(raw) {
            Some(key) => (key.clone(), true),
            None => (raw.to_string(), false),
        }
    }
}

/// Builds the typed dependency graph and its statistics.
pub struct DependencyAnalyzer {
    cycle_cap: usize,
}

impl Default for DependencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self {
            cycle_cap: DEFAULT_CYCLE_CAP,
        }
    }

    pub fn with_cycle_cap(mut self, cycle_cap: usize) -> Self {
        self.cycle_cap = cycle_cap.max(1);
        self
    }

    /// Analyze a full snapshot.
    pub fn analyze(&self, resources: &[Resource]) -> DependencyReport {
        let index = ResourceIndex::build(resources);

        let mut edges: Vec<Dependency> = Vec::new();
        let mut seen: HashSet<(String, String, RelationshipKind)> = HashSet::new();
        let mut unresolved = 0usize;

        for resource in resources {
            for (edge, resolved) in self.extract(resource, &index) {
                if !resolved {
                    unresolved += 1;
                }
                let key = (
                    edge.source_arn.clone(),
                    edge.target_arn.clone(),
                    edge.relationship,
                );
                if seen.insert(key) {
                    edges.push(edge);
                }
            }
        }

        // Heuristic same-stack grouping, suppressed where explicit edges
        // already connect the pair.
        let linked: HashSet<(String, String)> = edges
            .iter()
            .map(|e| (e.source_arn.clone(), e.target_arn.clone()))
            .collect();
        edges.extend(self.same_stack_edges(resources, &linked));

        let stats = self.graph_stats(resources, &edges);

        debug!(
            edges = edges.len(),
            unresolved,
            cycles = stats.cycles,
            islands = stats.islands,
            "dependency graph built"
        );

        DependencyReport {
            edges,
            stats,
            unresolved_references: unresolved,
            generated_at: Utc::now(),
        }
    }

    /// Extract one resource's edges via the rule table plus its declared
    /// dependency list.
    fn extract(&self, resource: &Resource, index: &ResourceIndex) -> Vec<(Dependency, bool)> {
        let source = resource.relationship_key();
        let mut out = Vec::new();

        for rule in EXTRACTION_RULES {
            if !(rule.applies)(resource) {
                continue;
            }
            for key in rule.keys {
                for raw in string_refs(&resource.configuration, key) {
                    let (target, resolved) = index.resolve(&raw);
                    if target == source {
                        continue;
                    }
                    let confidence = if resolved { 1.0 } else { UNRESOLVED_CONFIDENCE };
                    out.push((
                        Dependency::new(source.clone(), target, rule.relationship)
                            .with_confidence(confidence),
                        resolved,
                    ));
                }
            }
        }

        for raw in &resource.dependencies {
            let (target, resolved) = index.resolve(raw);
            if target == source {
                continue;
            }
            let confidence = if resolved { 1.0 } else { UNRESOLVED_CONFIDENCE };
            out.push((
                Dependency::new(source.clone(), target, RelationshipKind::DependsOn)
                    .with_confidence(confidence),
                resolved,
            ));
        }

        out
    }

    /// Group resources by `(provider, service, Environment, Project)` and
    /// link each group member to its first member.
    fn same_stack_edges(
        &self,
        resources: &[Resource],
        linked: &HashSet<(String, String)>,
    ) -> Vec<Dependency> {
        let mut groups: HashMap<(String, String, String, String), Vec<String>> = HashMap::new();
        for resource in resources {
            let (Some(environment), Some(project)) =
                (resource.tag("Environment"), resource.tag("Project"))
            else {
                continue;
            };
            groups
                .entry((
                    resource.provider.clone(),
                    resource.service.clone(),
                    environment.to_string(),
                    project.to_string(),
                ))
                .or_default()
                .push(resource.relationship_key());
        }

        let mut edges = Vec::new();
        for members in groups.into_values() {
            let Some((anchor, rest)) = members.split_first() else {
                continue;
            };
            for member in rest {
                let pair_linked = linked.contains(&(member.clone(), anchor.clone()))
                    || linked.contains(&(anchor.clone(), member.clone()));
                if pair_linked {
                    continue;
                }
                edges.push(
                    Dependency::new(member.clone(), anchor.clone(), RelationshipKind::SameStack)
                        .with_confidence(SAME_STACK_CONFIDENCE),
                );
            }
        }
        edges
    }

    /// Nodes are the snapshot members; edges pointing outside the snapshot
    /// do not participate in the statistics.
    fn graph_stats(&self, resources: &[Resource], edges: &[Dependency]) -> GraphStats {
        GraphStatsBuilder::new(resources, edges, self.cycle_cap).build()
    }
}

/// Internal graph machinery over integer node ids.
struct GraphStatsBuilder {
    node_count: usize,
    /// (source, target, confidence) with both endpoints in the snapshot.
    edges: Vec<(usize, usize, f64)>,
    cycle_cap: usize,
}

impl GraphStatsBuilder {
    fn new(resources: &[Resource], edges: &[Dependency], cycle_cap: usize) -> Self {
        let mut ids: HashMap<String, usize> = HashMap::new();
        for resource in resources {
            let next = ids.len();
            ids.entry(resource.relationship_key()).or_insert(next);
        }

        let internal = edges
            .iter()
            .filter_map(|edge| {
                let source = *ids.get(&edge.source_arn)?;
                let target = *ids.get(&edge.target_arn)?;
                Some((source, target, edge.confidence))
            })
            .collect();

        Self {
            node_count: ids.len(),
            edges: internal,
            cycle_cap,
        }
    }

    fn build(self) -> GraphStats {
        let cycles = self.count_cycles(&HashSet::new());
        let islands = self.count_islands();
        let removed = self.break_cycles();
        let max_depth = self.longest_path(&removed);

        GraphStats {
            total_resources: self.node_count,
            total_dependencies: self.edges.len(),
            cycles,
            islands,
            max_depth,
        }
    }

    fn adjacency(&self, removed: &HashSet<usize>) -> Vec<Vec<(usize, usize)>> {
        let mut adjacency = vec![Vec::new(); self.node_count];
        for (edge_idx, (source, target, _)) in self.edges.iter().enumerate() {
            if !removed.contains(&edge_idx) {
                adjacency[*source].push((edge_idx, *target));
            }
        }
        adjacency
    }

    /// Count back edges of an iterative three-colour DFS, capped. For
    /// snapshots whose cycles are edge-disjoint this equals the simple
    /// cycle count; beyond the cap the true count is at least the cap.
    fn count_cycles(&self, removed: &HashSet<usize>) -> usize {
        let adjacency = self.adjacency(removed);
        let mut colour = vec![0u8; self.node_count]; // 0 white, 1 grey, 2 black
        let mut cycles = 0usize;

        for start in 0..self.node_count {
            if colour[start] != 0 {
                continue;
            }
            // (node, next neighbour position); positions advance in place.
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            colour[start] = 1;

            while let Some(&(node, position)) = stack.last() {
                if position < adjacency[node].len() {
                    stack.last_mut().expect("stack is non-empty").1 += 1;
                    let (_, target) = adjacency[node][position];
                    match colour[target] {
                        1 => {
                            cycles += 1;
                            if cycles >= self.cycle_cap {
                                return self.cycle_cap;
                            }
                        }
                        0 => {
                            colour[target] = 1;
                            stack.push((target, 0));
                        }
                        _ => {}
                    }
                } else {
                    colour[node] = 2;
                    stack.pop();
                }
            }
        }

        cycles
    }

    /// Connected components of the undirected projection.
    fn count_islands(&self) -> usize {
        let mut parent: Vec<usize> = (0..self.node_count).collect();

        fn find(parent: &mut Vec<usize>, mut node: usize) -> usize {
            while parent[node] != node {
                parent[node] = parent[parent[node]];
                node = parent[node];
            }
            node
        }

        for (source, target, _) in &self.edges {
            let a = find(&mut parent, *source);
            let b = find(&mut parent, *target);
            if a != b {
                parent[a] = b;
            }
        }

        (0..self.node_count)
            .filter(|&node| find(&mut parent, node) == node)
            .count()
    }

    /// Break every cycle at its lowest-confidence edge (ties resolved
    /// toward the closing edge) and report the removed set.
    fn break_cycles(&self) -> HashSet<usize> {
        let mut removed: HashSet<usize> = HashSet::new();

        for _ in 0..self.cycle_cap {
            let Some(cycle) = self.find_cycle(&removed) else {
                return removed;
            };
            let weakest = cycle
                .iter()
                .copied()
                .reduce(|best, candidate| {
                    // `<=` prefers the later edge, i.e. the closing edge.
                    if self.edges[candidate].2 <= self.edges[best].2 {
                        candidate
                    } else {
                        best
                    }
                })
                .expect("cycle is never empty");
            removed.insert(weakest);
        }

        // Pathological inputs past the cap: drop every remaining back edge
        // in one sweep so the depth computation still terminates.
        while let Some(cycle) = self.find_cycle(&removed) {
            removed.insert(*cycle.last().expect("cycle is never empty"));
        }
        removed
    }

    /// Find one cycle as a list of edge indexes, or None if acyclic.
    fn find_cycle(&self, removed: &HashSet<usize>) -> Option<Vec<usize>> {
        let adjacency = self.adjacency(removed);
        let mut colour = vec![0u8; self.node_count];

        for start in 0..self.node_count {
            if colour[start] != 0 {
                continue;
            }
            // stack[i] walks a node's adjacency; path_edges[i] is the edge
            // taken from stack[i] to stack[i + 1].
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            let mut path_edges: Vec<usize> = Vec::new();
            colour[start] = 1;

            while let Some(&(node, position)) = stack.last() {
                if position < adjacency[node].len() {
                    stack.last_mut().expect("stack is non-empty").1 += 1;
                    let (edge_idx, target) = adjacency[node][position];
                    match colour[target] {
                        1 => {
                            let anchor = stack
                                .iter()
                                .position(|&(n, _)| n == target)
                                .expect("grey node is on the stack");
                            let mut cycle: Vec<usize> = path_edges[anchor..].to_vec();
                            cycle.push(edge_idx);
                            return Some(cycle);
                        }
                        0 => {
                            colour[target] = 1;
                            stack.push((target, 0));
                            path_edges.push(edge_idx);
                        }
                        _ => {}
                    }
                } else {
                    colour[node] = 2;
                    stack.pop();
                    path_edges.pop();
                }
            }
        }

        None
    }

    /// Longest path (in edges) of the DAG left after cycle-breaking.
    fn longest_path(&self, removed: &HashSet<usize>) -> usize {
        let adjacency = self.adjacency(removed);

        let mut indegree = vec![0usize; self.node_count];
        for neighbours in &adjacency {
            for &(_, target) in neighbours {
                indegree[target] += 1;
            }
        }

        let mut queue: Vec<usize> = (0..self.node_count)
            .filter(|&node| indegree[node] == 0)
            .collect();
        let mut depth = vec![0usize; self.node_count];
        let mut max_depth = 0usize;

        while let Some(node) = queue.pop() {
            for &(_, target) in &adjacency[node] {
                if depth[node] + 1 > depth[target] {
                    depth[target] = depth[node] + 1;
                    max_depth = max_depth.max(depth[target]);
                }
                indegree[target] -= 1;
                if indegree[target] == 0 {
                    queue.push(target);
                }
            }
        }

        max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(id: &str) -> Resource {
        Resource::new("aws", "a1", id, "ec2", "instance", id)
    }

    #[test]
    fn test_string_refs_shapes() {
        let config = json!({
            "vpc_id": "vpc-1",
            "security_groups": ["sg-1", "sg-2"],
            "event_sources": [{"arn": "arn:q", "batch": 10}],
            "empty": "",
        });
        assert_eq!(string_refs(&config, "vpc_id"), vec!["vpc-1"]);
        assert_eq!(string_refs(&config, "security_groups"), vec!["sg-1", "sg-2"]);
        assert_eq!(string_refs(&config, "event_sources"), vec!["arn:q"]);
        assert!(string_refs(&config, "empty").is_empty());
        assert!(string_refs(&config, "missing").is_empty());
    }

    #[test]
    fn test_instance_edges_resolve_against_snapshot() {
        let mut instance = resource("i-1");
        instance.configuration = json!({
            "security_groups": ["sg-1"],
            "vpc_id": "vpc-unknown",
        });
        let mut group = resource("sg-1");
        group.service = "ec2".to_string();
        group.resource_type = "security_group".to_string();

        let report = DependencyAnalyzer::new().analyze(&[instance, group]);

        let sg_edge = report
            .edges
            .iter()
            .find(|e| e.relationship == RelationshipKind::UsesSecurityGroup)
            .unwrap();
        assert_eq!(sg_edge.confidence, 1.0);
        assert_eq!(sg_edge.target_arn, "aws:a1:sg-1");

        let vpc_edge = report
            .edges
            .iter()
            .find(|e| e.relationship == RelationshipKind::RunsInVpc)
            .unwrap();
        assert!(vpc_edge.confidence < 1.0);
        assert_eq!(vpc_edge.target_arn, "vpc-unknown");
        assert_eq!(report.unresolved_references, 1);
    }

    #[test]
    fn test_same_stack_suppressed_by_explicit_edges() {
        let mut a = resource("i-1");
        a.tags = [("Environment", "prod"), ("Project", "atlas")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut b = resource("i-2");
        b.tags = a.tags.clone();
        b.dependencies = vec!["i-1".to_string()];

        let report = DependencyAnalyzer::new().analyze(&[a, b]);

        // The explicit depends_on edge exists; no same_stack duplicate.
        assert!(report
            .edges
            .iter()
            .any(|e| e.relationship == RelationshipKind::DependsOn));
        assert!(!report
            .edges
            .iter()
            .any(|e| e.relationship == RelationshipKind::SameStack));
    }

    #[test]
    fn test_same_stack_groups_without_explicit_edges() {
        let mut a = resource("i-1");
        a.tags = [("Environment", "prod"), ("Project", "atlas")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut b = resource("i-2");
        b.tags = a.tags.clone();

        let report = DependencyAnalyzer::new().analyze(&[a, b]);

        let stack_edge = report
            .edges
            .iter()
            .find(|e| e.relationship == RelationshipKind::SameStack)
            .unwrap();
        assert!(stack_edge.confidence <= 0.5);
    }

    #[test]
    fn test_graph_stats_on_shared_vertex_triangles() {
        // Two directed triangles sharing vertex a, plus two isolated nodes:
        // cycles = 2, islands = 3, and after breaking each cycle at its
        // closing edge the longest path has 2 edges.
        let mut a = resource("a");
        a.dependencies = vec!["b".to_string(), "d".to_string()];
        let mut b = resource("b");
        b.dependencies = vec!["c".to_string()];
        let mut c = resource("c");
        c.dependencies = vec!["a".to_string()];
        let mut d = resource("d");
        d.dependencies = vec!["e".to_string()];
        let mut e = resource("e");
        e.dependencies = vec!["a".to_string()];
        let f = resource("f");
        let g = resource("g");

        let report = DependencyAnalyzer::new().analyze(&[a, b, c, d, e, f, g]);

        assert_eq!(report.stats.total_resources, 7);
        assert_eq!(report.stats.total_dependencies, 6);
        assert_eq!(report.stats.cycles, 2);
        assert_eq!(report.stats.islands, 3);
        assert_eq!(report.stats.max_depth, 2);
    }

    #[test]
    fn test_cycle_cap_is_reported_as_floor() {
        // A 3-node graph where every pair is mutually linked has many
        // simple cycles; with a cap of 2 the count reports the cap.
        let mut a = resource("a");
        a.dependencies = vec!["b".to_string(), "c".to_string()];
        let mut b = resource("b");
        b.dependencies = vec!["a".to_string(), "c".to_string()];
        let mut c = resource("c");
        c.dependencies = vec!["a".to_string(), "b".to_string()];

        let report = DependencyAnalyzer::new()
            .with_cycle_cap(2)
            .analyze(&[a, b, c]);
        assert_eq!(report.stats.cycles, 2);
    }

    #[test]
    fn test_acyclic_chain_depth() {
        let mut a = resource("a");
        a.dependencies = vec!["b".to_string()];
        let mut b = resource("b");
        b.dependencies = vec!["c".to_string()];
        let c = resource("c");

        let report = DependencyAnalyzer::new().analyze(&[a, b, c]);
        assert_eq!(report.stats.cycles, 0);
        assert_eq!(report.stats.islands, 1);
        assert_eq!(report.stats.max_depth, 2);
    }
}
