//! Placement scheduling: feasibility search, penalty scoring and batch
//! commitment.
//!
//! A creation batch is attempted on every candidate rack group; each attempt
//! speculatively places and unplaces VMs on the pool and returns a plan with
//! a penalty, leaving the pool untouched. The lowest-penalty feasible plan
//! is committed. Any infeasible batch (or an exhausted session budget) is a
//! terminal error for the whole session.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::time::Instant;

use log::debug;

use crate::core::candidates::candidate_groups;
use crate::core::common::{Affinity, NodeAddr, PmAddr, RackAddr};
use crate::core::config::EngineConfig;
use crate::core::placement_group::PlacementGroup;
use crate::core::resource_pool::{FleetLayout, ResourcePoolState};
use crate::core::vm::{VirtualMachine, VmType};

/// Terminal failure of a creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    /// No candidate rack group admits the batch under the hard constraints.
    Infeasible,
    /// The session wall-clock budget ran out before the request.
    BudgetExhausted,
}

impl Display for PlacementError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PlacementError::Infeasible => write!(f, "no feasible placement"),
            PlacementError::BudgetExhausted => write!(f, "session time budget exhausted"),
        }
    }
}

/// Location of one placed VM, 1-based as emitted to the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmPlacement {
    pub vm: u32,
    pub domain: u32,
    pub rack: u32,
    pub pm: u32,
    pub nodes: Vec<u32>,
}

impl Display for VmPlacement {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{} {} {}", self.domain, self.rack, self.pm)?;
        for node in &self.nodes {
            write!(f, " {}", node)?;
        }
        Ok(())
    }
}

/// A feasible assignment of every batch VM to its nodes, plus the penalty
/// used to pick among feasible groups.
struct PlacementPlan {
    assignments: HashMap<u32, Vec<NodeAddr>>,
    penalty: f64,
}

/// The single-threaded placement decision engine over one fleet.
pub struct Scheduler {
    pool: ResourcePoolState,
    types: Vec<VmType>,
    groups: HashMap<u32, PlacementGroup>,
    vms: HashMap<u32, VirtualMachine>,
    config: EngineConfig,
    started: Instant,
}

impl Scheduler {
    pub fn new(layout: &FleetLayout, types: Vec<VmType>, config: EngineConfig) -> Self {
        Self {
            pool: ResourcePoolState::new(layout),
            types,
            groups: HashMap::new(),
            vms: HashMap::new(),
            config,
            started: Instant::now(),
        }
    }

    pub fn pool(&self) -> &ResourcePoolState {
        &self.pool
    }

    pub fn vm(&self, index: u32) -> Option<&VirtualMachine> {
        self.vms.get(&index)
    }

    pub fn group(&self, index: u32) -> Option<&PlacementGroup> {
        self.groups.get(&index)
    }

    /// Registers a placement group.
    pub fn create_group(
        &mut self,
        index: u32,
        rack_partitions: u32,
        soft_pm_limit: u32,
        domain_affinity: Affinity,
        rack_affinity: Affinity,
    ) {
        self.groups.insert(
            index,
            PlacementGroup::new(index, rack_partitions, soft_pm_limit, domain_affinity, rack_affinity),
        );
    }

    /// Places a batch of VMs, committing the lowest-penalty feasible plan.
    ///
    /// Returns per-VM locations in the order of `indices`. On failure the
    /// batch records are discarded (a partially created batch is never
    /// live) and the session is expected to stop.
    pub fn create_vms(
        &mut self,
        indices: &[u32],
        type_index: u32,
        group_index: u32,
        partition: i64,
    ) -> Result<Vec<VmPlacement>, PlacementError> {
        if self.started.elapsed().as_secs_f64() >= self.config.time_budget {
            return Err(PlacementError::BudgetExhausted);
        }

        let ty = self
            .types
            .get((type_index - 1) as usize)
            .cloned()
            .unwrap_or_else(|| panic!("unknown vm type {}", type_index));
        let mut group = self
            .groups
            .remove(&group_index)
            .unwrap_or_else(|| panic!("unknown placement group {}", group_index));

        let partition = if group.rack_partitions == 0 { 0 } else { partition };

        for (position, &index) in indices.iter().enumerate() {
            let vm_partition = if partition >= 0 {
                partition as u32
            } else {
                (position + 1) as u32
            };
            self.vms
                .insert(index, VirtualMachine::new(index, type_index, group_index, vm_partition));
            group.vms.push(index);
        }

        group.refresh_targets(&self.vms);

        let mut best: Option<PlacementPlan> = None;
        for racks in candidate_groups(&mut self.pool, &group, &ty, indices.len()) {
            let Some(plan) = self.evaluate_group(&mut group, indices, &ty, &racks) else {
                continue;
            };
            debug!("candidate group of {} racks: penalty {:.3}", racks.len(), plan.penalty);
            if best.as_ref().map_or(true, |found| plan.penalty < found.penalty) {
                best = Some(plan);
            }
        }

        let Some(plan) = best else {
            for &index in indices {
                self.vms.remove(&index);
            }
            group.vms.retain(|vm| !indices.contains(vm));
            group.refresh_targets(&self.vms);
            self.groups.insert(group_index, group);
            return Err(PlacementError::Infeasible);
        };

        let mut result = Vec::with_capacity(indices.len());
        for &index in indices {
            let nodes = plan
                .assignments
                .get(&index)
                .expect("plan covers every batch vm")
                .clone();
            let home = nodes[0].pm();
            let vm = self.vms.get_mut(&index).expect("batch vm is registered");
            self.pool.place_vm(vm, &ty, nodes.clone());
            result.push(VmPlacement {
                vm: index,
                domain: (home.domain + 1) as u32,
                rack: (home.rack + 1) as u32,
                pm: (home.pm + 1) as u32,
                nodes: nodes.iter().map(|node| (node.node + 1) as u32).collect(),
            });
        }

        group.refresh_targets(&self.vms);
        self.groups.insert(group_index, group);
        Ok(result)
    }

    /// Unplaces and drops the given VMs.
    pub fn delete_vms(&mut self, indices: &[u32]) {
        for &index in indices {
            let mut vm = self
                .vms
                .remove(&index)
                .unwrap_or_else(|| panic!("delete of unknown vm {}", index));
            let ty_position = (vm.type_index - 1) as usize;
            if vm.is_placed() {
                self.pool.unplace_vm(&mut vm, &self.types[ty_position]);
            }
            let group = self
                .groups
                .get_mut(&vm.group)
                .expect("vm belongs to a known group");
            group.vms.retain(|&member| member != index);
        }
    }

    /// Attempts the batch on one rack group. The pool is restored to its
    /// entry state on every path; a returned plan is only a recipe, nothing
    /// stays placed.
    fn evaluate_group(
        &mut self,
        group: &mut PlacementGroup,
        batch: &[u32],
        ty: &VmType,
        racks: &[RackAddr],
    ) -> Option<PlacementPlan> {
        let plan = self.try_group(group, batch, ty, racks);
        self.unplace_all(batch, ty);
        plan
    }

    fn try_group(
        &mut self,
        group: &mut PlacementGroup,
        batch: &[u32],
        ty: &VmType,
        racks: &[RackAddr],
    ) -> Option<PlacementPlan> {
        let mut assignments = HashMap::new();
        let mut penalty = 0.0;

        let mut by_partition: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for &index in batch {
            by_partition.entry(self.vms[&index].partition).or_default().push(index);
        }

        for (partition, vms) in by_partition {
            // later partitions must see the resources claimed by earlier ones
            group.refresh_targets(&self.vms);

            let (mut start, mut overflow) = self.partition_rack_order(group, partition, racks);
            if start.is_empty() {
                if overflow.is_empty() {
                    return None;
                }
                start.push(overflow.remove(0));
            }

            let mut placed = false;
            'force: for force in [false, true] {
                let mut current = start.clone();
                let mut extra = overflow.clone();
                loop {
                    if let Some((found, partition_penalty)) =
                        self.try_place(group, &vms, ty, &mut current, force)
                    {
                        assignments.extend(found);
                        penalty += partition_penalty;
                        placed = true;
                        break 'force;
                    }
                    if extra.is_empty() {
                        break;
                    }
                    current.push(extra.remove(0));
                }
            }
            if !placed {
                return None;
            }
        }

        // tie-break toward emptier parts of the fleet
        let total_load: f64 = racks.iter().map(|&rack| self.pool.rack(rack).resources.load()).sum();
        penalty += total_load / racks.len() as f64;

        Some(PlacementPlan { assignments, penalty })
    }

    /// Start and overflow rack lists for one partition of a group attempt.
    ///
    /// For a real partition, racks hosting a foreign partition are dropped,
    /// racks already hosting this partition come first (most loaded first,
    /// to pack them) and the overflow holds the remaining racks in load
    /// order. Under a still-achievable soft rack affinity the start list is
    /// pinned to the target rack (or the least loaded rack); otherwise the
    /// whole group is the start list.
    fn partition_rack_order(
        &self,
        group: &PlacementGroup,
        partition: u32,
        racks: &[RackAddr],
    ) -> (Vec<RackAddr>, Vec<RackAddr>) {
        let mut sorted = racks.to_vec();
        sorted.sort_by(|a, b| {
            self.pool
                .rack(*a)
                .resources
                .load()
                .total_cmp(&self.pool.rack(*b).resources.load())
        });

        if partition > 0 {
            let mut foreign: BTreeSet<RackAddr> = BTreeSet::new();
            for (&other, other_racks) in &group.partition_racks {
                if other != partition {
                    foreign.extend(other_racks.iter().copied());
                }
            }
            let own = group.partition_racks.get(&partition);
            let mut start: Vec<RackAddr> = sorted
                .iter()
                .copied()
                .filter(|rack| own.map_or(false, |set| set.contains(rack)) && !foreign.contains(rack))
                .collect();
            start.sort_by(|a, b| {
                self.pool
                    .rack(*b)
                    .resources
                    .load()
                    .total_cmp(&self.pool.rack(*a).resources.load())
            });
            let overflow: Vec<RackAddr> = sorted
                .iter()
                .copied()
                .filter(|rack| !foreign.contains(rack) && !start.contains(rack))
                .collect();
            (start, overflow)
        } else if group.rack_affinity == Affinity::Soft && group.rack_affinity_possible {
            match group.target_rack {
                Some(target) if racks.contains(&target) => {
                    let overflow = sorted.iter().copied().filter(|&rack| rack != target).collect();
                    (vec![target], overflow)
                }
                _ => {
                    if sorted.is_empty() {
                        return (Vec::new(), Vec::new());
                    }
                    let start = vec![sorted[0]];
                    (start, sorted[1..].to_vec())
                }
            }
        } else {
            (sorted, Vec::new())
        }
    }

    /// One placement attempt of a partition on the given rack list. On
    /// success the partition's VMs stay placed (later partitions must see
    /// the claimed resources) and the assignments plus the constraint
    /// penalty are returned.
    fn try_place(
        &mut self,
        group: &mut PlacementGroup,
        vms: &[u32],
        ty: &VmType,
        racks: &mut Vec<RackAddr>,
        force: bool,
    ) -> Option<(HashMap<u32, Vec<NodeAddr>>, f64)> {
        self.unplace_all(vms, ty);

        let mut cpu_available: u64 = 0;
        let mut memory_available: u64 = 0;
        for &rack in racks.iter() {
            let resources = &self.pool.rack(rack).resources;
            cpu_available += resources.cpu_available as u64;
            memory_available += resources.memory_available;
        }
        let count = vms.len() as u64;
        if count * ty.pm_cpu() as u64 > cpu_available || count * ty.pm_memory() > memory_available {
            return None;
        }

        let mut assignments = HashMap::new();
        self.greedy_pass(group, vms, ty, racks, &mut assignments, false);
        if force && assignments.len() < vms.len() {
            self.greedy_pass(group, vms, ty, racks, &mut assignments, true);
        }
        if assignments.len() < vms.len() {
            return None;
        }

        group.refresh_targets(&self.vms);

        let mut penalty = 0.0;
        if group.soft_pm_limit > 0 && group.soft_pm_limit_active {
            for &index in vms {
                let home = self.vms[&index].home_pm().expect("vm was placed");
                if self.pool.pm(home).group_count(group.index) > group.soft_pm_limit {
                    penalty += 1.0;
                }
            }
        }
        if group.domain_affinity == Affinity::Soft && !group.domain_affinity_possible {
            penalty += self.config.soft_affinity_penalty;
        }
        if group.rack_affinity == Affinity::Soft && !group.rack_affinity_possible {
            penalty += self.config.soft_affinity_penalty;
        }

        Some((assignments, penalty))
    }

    /// Greedy per-VM walk. Racks are re-sorted before every VM (largest
    /// type-fit first, then least loaded); PMs are walked in index order;
    /// PMs at the soft per-PM limit are skipped unless `force` is set.
    fn greedy_pass(
        &mut self,
        group: &PlacementGroup,
        vms: &[u32],
        ty: &VmType,
        racks: &mut Vec<RackAddr>,
        assignments: &mut HashMap<u32, Vec<NodeAddr>>,
        force: bool,
    ) {
        for &index in vms {
            if self.vms[&index].is_placed() {
                continue;
            }

            let mut keyed: Vec<(u32, f64, RackAddr)> = Vec::with_capacity(racks.len());
            for &rack in racks.iter() {
                let fit = self.pool.rack_mut(rack).type_fit(ty);
                let load = self.pool.rack(rack).resources.load();
                keyed.push((fit, load, rack));
            }
            keyed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.total_cmp(&b.1)));
            *racks = keyed.into_iter().map(|(_, _, rack)| rack).collect();

            'racks: for position in 0..racks.len() {
                let rack = racks[position];
                if !self
                    .pool
                    .rack(rack)
                    .resources
                    .has_capacity(ty.pm_cpu(), ty.pm_memory())
                {
                    continue;
                }
                let pm_count = self.pool.rack(rack).pms.len();
                for pm in 0..pm_count {
                    let addr = PmAddr {
                        domain: rack.domain,
                        rack: rack.rack,
                        pm,
                    };
                    if let Some(nodes) = self.pick_nodes(group, ty, addr, force) {
                        assignments.insert(index, nodes.clone());
                        let vm = self.vms.get_mut(&index).expect("batch vm is registered");
                        self.pool.place_vm(vm, ty, nodes);
                        break 'racks;
                    }
                }
            }
        }
    }

    /// Chooses `ty.nodes` nodes on one PM, preferring the nodes with the
    /// largest remaining fit. None if the PM is skipped or short on nodes.
    fn pick_nodes(
        &mut self,
        group: &PlacementGroup,
        ty: &VmType,
        addr: PmAddr,
        force: bool,
    ) -> Option<Vec<NodeAddr>> {
        let pm = self.pool.pm_mut(addr);
        if !pm.resources.has_capacity(ty.pm_cpu(), ty.pm_memory()) {
            return None;
        }
        if !force
            && group.soft_pm_limit > 0
            && group.soft_pm_limit_active
            && pm.group_count(group.index) >= group.soft_pm_limit
        {
            return None;
        }

        let mut order: Vec<(u32, usize)> = pm
            .nodes
            .iter_mut()
            .enumerate()
            .map(|(node, state)| (state.type_fit(ty), node))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0));

        let mut chosen = Vec::with_capacity(ty.nodes as usize);
        for (_, node) in order {
            if !pm.nodes[node].resources.has_capacity(ty.cpu, ty.memory) {
                continue;
            }
            chosen.push(NodeAddr {
                domain: addr.domain,
                rack: addr.rack,
                pm: addr.pm,
                node,
            });
            if chosen.len() == ty.nodes as usize {
                break;
            }
        }
        if chosen.len() < ty.nodes as usize {
            return None;
        }
        Some(chosen)
    }

    fn unplace_all(&mut self, vms: &[u32], ty: &VmType) {
        for &index in vms {
            let vm = self.vms.get_mut(&index).expect("batch vm is registered");
            if vm.is_placed() {
                self.pool.unplace_vm(vm, ty);
            }
        }
    }
}
