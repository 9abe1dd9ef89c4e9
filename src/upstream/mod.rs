//! # Upstream analyses
//!
//! Concrete stand-ins for the type environment, dependency graph,
//! stratification, and relation-expiry schedule that, in a full compiler,
//! live upstream of the middle end and are consumed verbatim. This module
//! builds them from an [`ast::Program`](crate::ast::Program) the same way
//! the rest of this crate's dependency-graph code builds a
//! `DependencyGraph`: positive/negative edges, Tarjan SCC detection, a
//! topological condensation order.
//!
//! This is glue for a runnable crate, not a reimplementation of a
//! production stratifier: there is no cost-based evaluation ordering and no
//! incremental re-stratification. It assumes the input program is already
//! stratifiable (no negative edge closes a cycle) and does not re-validate
//! that upstream guarantee.

use crate::ast::{Program, RelationDecl};
use std::collections::{HashMap, HashSet};

/// Name/arity/I-O lookup for every declared relation, built once from the
/// program and threaded through translation by reference (§9: "encapsulate
/// the config store as an explicit parameter" applies equally here).
#[derive(Debug, Clone, Default)]
pub struct TypeEnvironment {
    relations: HashMap<String, RelationDecl>,
}

impl TypeEnvironment {
    pub fn from_program(program: &Program) -> Self {
        TypeEnvironment {
            relations: program.relations.iter().map(|r| (r.name.clone(), r.clone())).collect(),
        }
    }

    pub fn decl(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.get(name)
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.relations.get(name).map(|r| r.arity)
    }

    pub fn is_input(&self, name: &str) -> bool {
        self.relations.get(name).map(|r| r.io.input).unwrap_or(false)
    }

    pub fn is_output(&self, name: &str) -> bool {
        self.relations.get(name).map(|r| r.io.output).unwrap_or(false)
    }

    pub fn is_printsize(&self, name: &str) -> bool {
        self.relations.get(name).map(|r| r.io.printsize).unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.relations.keys()
    }
}

/// Type of dependency between relations, used to detect stratified negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyType {
    Positive,
    Negative,
}

/// Relation-level dependency graph: `head -> body relation` edges, one per
/// distinct (rule, body atom) pair.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub edges: HashMap<String, Vec<(String, DependencyType)>>,
    pub relations: HashSet<String>,
}

impl DependencyGraph {
    pub fn from_program(program: &Program) -> Self {
        let mut graph = DependencyGraph::default();
        for decl in &program.relations {
            graph.relations.insert(decl.name.clone());
        }
        for rule in &program.rules {
            graph.relations.insert(rule.head.relation.clone());
            for atom in rule.positive_body_atoms() {
                graph.relations.insert(atom.relation.clone());
                graph
                    .edges
                    .entry(rule.head.relation.clone())
                    .or_default()
                    .push((atom.relation.clone(), DependencyType::Positive));
            }
            for atom in rule.negated_body_atoms() {
                graph.relations.insert(atom.relation.clone());
                graph
                    .edges
                    .entry(rule.head.relation.clone())
                    .or_default()
                    .push((atom.relation.clone(), DependencyType::Negative));
            }
        }
        graph
    }

    fn successors(&self, relation: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(relation)
            .into_iter()
            .flatten()
            .map(|(rel, _)| rel.as_str())
    }
}

/// One strongly connected component of the relation dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scc {
    pub members: Vec<String>,
    /// Whether the lone member has a direct positive edge to itself.
    /// Tarjan correctly isolates a self-loop as a size-1 component (it is
    /// not, by itself, a back-edge to an *earlier* node on the stack), so
    /// `members.len() > 1` alone misses the single most common recursive
    /// Datalog shape (`reach(x,z) :- reach(x,y), edge(y,z).`).
    self_loop: bool,
}

impl Scc {
    pub fn is_recursive(&self) -> bool {
        self.members.len() > 1 || self.self_loop
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.members.iter().any(|m| m == relation)
    }
}

/// Tarjan SCC decomposition plus a topological order over the condensation,
/// exposed together since every consumer needs both.
#[derive(Debug, Clone)]
pub struct SccGraph {
    sccs: Vec<Scc>,
    /// Index into `sccs` for each relation.
    membership: HashMap<String, usize>,
    /// Indices into `sccs`, producers before consumers.
    topo_order: Vec<usize>,
}

impl SccGraph {
    pub fn build(graph: &DependencyGraph) -> Self {
        let components = tarjan_scc(graph);
        let mut membership = HashMap::new();
        for (idx, scc) in components.iter().enumerate() {
            for member in &scc.members {
                membership.insert(member.clone(), idx);
            }
        }
        let topo_order = topological_order(graph, &components, &membership);
        SccGraph {
            sccs: components,
            membership,
            topo_order,
        }
    }

    pub fn stratum_of(&self, relation: &str) -> Option<usize> {
        self.membership.get(relation).copied()
    }

    pub fn scc(&self, index: usize) -> &Scc {
        &self.sccs[index]
    }

    pub fn strata_count(&self) -> usize {
        self.sccs.len()
    }

    /// SCC indices in evaluation order: every relation an SCC's rules read
    /// has already been produced by an earlier entry.
    pub fn topological_order(&self) -> &[usize] {
        &self.topo_order
    }

    /// Relations read by rules in `scc_index` but owned by a different SCC.
    pub fn external_predecessors(&self, program: &Program, scc_index: usize) -> Vec<String> {
        let scc = &self.sccs[scc_index];
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for rule in &program.rules {
            if !scc.contains(&rule.head.relation) {
                continue;
            }
            for atom in rule.positive_body_atoms().into_iter().chain(rule.negated_body_atoms()) {
                if !scc.contains(&atom.relation) && seen.insert(atom.relation.clone()) {
                    out.push(atom.relation.clone());
                }
            }
        }
        out
    }

    /// Relations owned by `scc_index` that a *different* (necessarily later,
    /// by topological order) SCC reads. Used to decide which internal
    /// relations must be `Store`d for a downstream stratum instead of
    /// dropped (§4.3.1 step 6).
    pub fn external_successors(&self, program: &Program, scc_index: usize) -> Vec<String> {
        let scc = &self.sccs[scc_index];
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for rule in &program.rules {
            if scc.contains(&rule.head.relation) {
                continue;
            }
            for atom in rule.positive_body_atoms().into_iter().chain(rule.negated_body_atoms()) {
                if scc.contains(&atom.relation) && seen.insert(atom.relation.clone()) {
                    out.push(atom.relation.clone());
                }
            }
        }
        out
    }
}

fn tarjan_scc(graph: &DependencyGraph) -> Vec<Scc> {
    struct State<'g> {
        graph: &'g DependencyGraph,
        index: HashMap<String, usize>,
        lowlink: HashMap<String, usize>,
        on_stack: HashSet<String>,
        stack: Vec<String>,
        next_index: usize,
        components: Vec<Scc>,
    }

    fn strongconnect(v: &str, state: &mut State) {
        state.index.insert(v.to_string(), state.next_index);
        state.lowlink.insert(v.to_string(), state.next_index);
        state.next_index += 1;
        state.stack.push(v.to_string());
        state.on_stack.insert(v.to_string());

        let successors: Vec<String> = state.graph.successors(v).map(|s| s.to_string()).collect();
        for w in successors {
            if !state.index.contains_key(&w) {
                strongconnect(&w, state);
                let w_low = state.lowlink[&w];
                let v_low = state.lowlink[v];
                state.lowlink.insert(v.to_string(), v_low.min(w_low));
            } else if state.on_stack.contains(&w) {
                let w_idx = state.index[&w];
                let v_low = state.lowlink[v];
                state.lowlink.insert(v.to_string(), v_low.min(w_idx));
            }
        }

        if state.lowlink[v] == state.index[v] {
            let mut members = Vec::new();
            loop {
                let w = state.stack.pop().expect("scc stack non-empty while closing component");
                state.on_stack.remove(&w);
                members.push(w.clone());
                if w == v {
                    break;
                }
            }
            members.sort();
            let self_loop = members.len() == 1
                && state
                    .graph
                    .edges
                    .get(&members[0])
                    .is_some_and(|edges| edges.iter().any(|(dep, ty)| dep == &members[0] && *ty == DependencyType::Positive));
            state.components.push(Scc { members, self_loop });
        }
    }

    let mut relations: Vec<String> = graph.relations.iter().cloned().collect();
    relations.sort();

    let mut state = State {
        graph,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };
    for relation in &relations {
        if !state.index.contains_key(relation) {
            strongconnect(relation, &mut state);
        }
    }
    state.components
}

fn topological_order(
    graph: &DependencyGraph,
    components: &[Scc],
    membership: &HashMap<String, usize>,
) -> Vec<usize> {
    let n = components.len();
    let mut indegree = vec![0usize; n];
    let mut condensation: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    for (head, deps) in &graph.edges {
        let Some(&head_scc) = membership.get(head) else { continue };
        for (dep, _) in deps {
            let Some(&dep_scc) = membership.get(dep) else { continue };
            if dep_scc != head_scc && condensation[head_scc].insert(dep_scc) {
                indegree[dep_scc] += 1;
            }
        }
    }
    // Kahn's algorithm over the reversed condensation: a node with no
    // remaining dependency edges pointing *at* it (i.e., nothing needs to
    // be scheduled before it) is ready. We want producers first, so we walk
    // from SCCs nothing depends on as a *dependency*... equivalently: find
    // SCCs that are not a dependency of any unscheduled SCC last. Simplest
    // correct formulation: schedule an SCC once all SCCs *it depends on*
    // have already been scheduled.
    let mut remaining_deps: Vec<HashSet<usize>> = condensation.clone();
    let mut scheduled = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let mut progressed = false;
        for i in 0..n {
            if scheduled[i] {
                continue;
            }
            if remaining_deps[i].iter().all(|d| scheduled[*d]) {
                scheduled[i] = true;
                order.push(i);
                progressed = true;
            }
        }
        if !progressed {
            // A genuine cycle across SCCs cannot happen since components
            // are already maximal; this only guards a malformed graph.
            for i in 0..n {
                if !scheduled[i] {
                    scheduled[i] = true;
                    order.push(i);
                }
            }
            break;
        }
    }
    order
}

/// Marks which (relation, rule-index-within-that-relation) pairs are
/// recursive: the clause reads a positive atom owned by its own SCC.
#[derive(Debug, Clone, Default)]
pub struct RecursiveClauses {
    recursive: HashSet<(String, usize)>,
}

impl RecursiveClauses {
    pub fn compute(program: &Program, sccs: &SccGraph) -> Self {
        let mut recursive = HashSet::new();
        let mut clause_index: HashMap<String, usize> = HashMap::new();
        for rule in &program.rules {
            let idx = clause_index.entry(rule.head.relation.clone()).or_insert(0);
            let this_idx = *idx;
            *idx += 1;
            let Some(head_scc) = sccs.stratum_of(&rule.head.relation) else { continue };
            let scc = sccs.scc(head_scc);
            if scc.is_recursive() && rule.positive_body_atoms().iter().any(|a| scc.contains(&a.relation)) {
                recursive.insert((rule.head.relation.clone(), this_idx));
            }
        }
        RecursiveClauses { recursive }
    }

    pub fn is_recursive(&self, relation: &str, clause_index: usize) -> bool {
        self.recursive.contains(&(relation.to_string(), clause_index))
    }
}

/// Per-relation expiry: the last SCC-topological-position at which a
/// relation is still read. After that position the translator may drop it.
#[derive(Debug, Clone, Default)]
pub struct RelationSchedule {
    expiry: HashMap<String, usize>,
}

impl RelationSchedule {
    pub fn compute(program: &Program, sccs: &SccGraph) -> Self {
        let mut expiry: HashMap<String, usize> = HashMap::new();
        let position_of: HashMap<usize, usize> =
            sccs.topological_order().iter().enumerate().map(|(pos, scc)| (*scc, pos)).collect();

        for rule in &program.rules {
            let Some(head_scc) = sccs.stratum_of(&rule.head.relation) else { continue };
            let Some(&position) = position_of.get(&head_scc) else { continue };
            for atom in rule.positive_body_atoms().into_iter().chain(rule.negated_body_atoms()) {
                let slot = expiry.entry(atom.relation.clone()).or_insert(position);
                if *slot < position {
                    *slot = position;
                }
            }
            // A relation must at minimum survive through its own stratum
            // (for Store/PrintSize).
            let slot = expiry.entry(rule.head.relation.clone()).or_insert(position);
            if *slot < position {
                *slot = position;
            }
        }
        RelationSchedule { expiry }
    }

    pub fn expires_at(&self, relation: &str) -> Option<usize> {
        self.expiry.get(relation).copied()
    }

    /// Whether `relation` may be dropped once `stratum_position` has
    /// finished (true iff its last use was at or before that position).
    pub fn expired_by(&self, relation: &str, stratum_position: usize) -> bool {
        self.expiry.get(relation).map(|e| *e <= stratum_position).unwrap_or(true)
    }
}

/// Bundles the four upstream analyses the translator treats as "consumed
/// verbatim" (§1, §6): the type environment, the SCC graph, which clauses
/// are recursive, and per-relation expiry. A full compiler computes these
/// upstream of the middle end; this crate computes them itself from the
/// same `ast::Program` so the translator has something concrete to consume
/// — it is glue for a runnable crate, not a re-implementation of a
/// production stratifier (no cost-based ordering, no incremental
/// re-stratification, per §11).
#[derive(Debug, Clone)]
pub struct UpstreamAnalyses {
    pub types: TypeEnvironment,
    pub sccs: SccGraph,
    pub recursive: RecursiveClauses,
    pub schedule: RelationSchedule,
}

impl UpstreamAnalyses {
    pub fn compute(program: &Program) -> Self {
        let types = TypeEnvironment::from_program(program);
        let graph = DependencyGraph::from_program(program);
        let sccs = SccGraph::build(&graph);
        let recursive = RecursiveClauses::compute(program, &sccs);
        let schedule = RelationSchedule::compute(program, &sccs);
        UpstreamAnalyses {
            types,
            sccs,
            recursive,
            schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::RuleBuilder;
    use crate::ast::{Program, RelationDecl};

    fn reach_program() -> Program {
        let mut program = Program::new();
        program.add_relation(RelationDecl::new("edge", 2).input());
        program.add_relation(RelationDecl::new("reach", 2).output());
        program.add_rule(RuleBuilder::new("reach").head_vars(["x", "y"]).body_atom("edge", ["x", "y"]).build());
        program.add_rule(
            RuleBuilder::new("reach")
                .head_vars(["x", "z"])
                .body_atom("reach", ["x", "y"])
                .body_atom("edge", ["y", "z"])
                .build(),
        );
        program
    }

    #[test]
    fn scc_groups_recursive_relation_alone() {
        let program = reach_program();
        let graph = DependencyGraph::from_program(&program);
        let sccs = SccGraph::build(&graph);
        let reach_idx = sccs.stratum_of("reach").unwrap();
        assert!(sccs.scc(reach_idx).is_recursive());
        assert!(sccs.scc(reach_idx).contains("reach"));
        assert!(!sccs.scc(reach_idx).contains("edge"));
    }

    #[test]
    fn topological_order_places_edge_before_reach() {
        let program = reach_program();
        let graph = DependencyGraph::from_program(&program);
        let sccs = SccGraph::build(&graph);
        let order = sccs.topological_order();
        let edge_pos = order.iter().position(|&i| sccs.scc(i).contains("edge")).unwrap();
        let reach_pos = order.iter().position(|&i| sccs.scc(i).contains("reach")).unwrap();
        assert!(edge_pos < reach_pos);
    }

    #[test]
    fn recursive_clauses_marks_only_the_recursive_rule() {
        let program = reach_program();
        let graph = DependencyGraph::from_program(&program);
        let sccs = SccGraph::build(&graph);
        let recursive = RecursiveClauses::compute(&program, &sccs);
        assert!(!recursive.is_recursive("reach", 0));
        assert!(recursive.is_recursive("reach", 1));
    }

    #[test]
    fn relation_schedule_expires_edge_no_earlier_than_reach_stratum() {
        let program = reach_program();
        let graph = DependencyGraph::from_program(&program);
        let sccs = SccGraph::build(&graph);
        let schedule = RelationSchedule::compute(&program, &sccs);
        let reach_scc = sccs.stratum_of("reach").unwrap();
        let reach_pos = sccs.topological_order().iter().position(|&i| i == reach_scc).unwrap();
        assert_eq!(schedule.expires_at("edge"), Some(reach_pos));
    }

    #[test]
    fn external_successors_reports_edge_is_read_by_reachs_scc() {
        let program = reach_program();
        let graph = DependencyGraph::from_program(&program);
        let sccs = SccGraph::build(&graph);
        let edge_scc = sccs.stratum_of("edge").unwrap();
        let successors = sccs.external_successors(&program, edge_scc);
        assert_eq!(successors, vec!["edge".to_string()]);
    }

    #[test]
    fn singleton_self_loop_is_still_recursive() {
        // reach(x,z) :- reach(x,y), edge(y,z). keeps `reach` alone in its own
        // SCC (no other relation cycles back through it), but it must still
        // be treated as recursive for semi-naive translation to engage.
        let program = reach_program();
        let graph = DependencyGraph::from_program(&program);
        let sccs = SccGraph::build(&graph);
        let reach_idx = sccs.stratum_of("reach").unwrap();
        assert_eq!(sccs.scc(reach_idx).members.len(), 1);
        assert!(sccs.scc(reach_idx).is_recursive());
    }

    #[test]
    fn upstream_analyses_computes_all_four_from_program_alone() {
        let program = reach_program();
        let analyses = UpstreamAnalyses::compute(&program);
        assert_eq!(analyses.types.arity("edge"), Some(2));
        assert!(analyses.sccs.scc(analyses.sccs.stratum_of("reach").unwrap()).is_recursive());
        assert!(analyses.recursive.is_recursive("reach", 1));
        assert!(analyses.schedule.expires_at("edge").is_some());
    }
}
