//! Hierarchical fleet state and resource accounting.
//!
//! The fleet is arena storage: the pool owns domains, domains own racks,
//! racks own PMs, PMs own NUMA nodes. Cross-references are plain index
//! addresses, so mutating any level is O(1) and there are no ownership
//! cycles. Availability at a non-leaf level is always the sum of its
//! descendants' availability; `place_vm`/`unplace_vm` keep the four levels
//! in sync by claiming per node at every level.

use std::collections::HashMap;

use crate::core::common::{NodeAddr, PmAddr, RackAddr};
use crate::core::vm::{VirtualMachine, VmType};

/// Per-level resource record: capacity, availability and the memoised
/// type-fit values of this level. The memo is cleared by any claim or
/// release at the level, never shared across levels.
#[derive(Debug, Clone)]
pub struct Resources {
    pub cpu_total: u32,
    pub memory_total: u64,
    pub cpu_available: u32,
    pub memory_available: u64,
    type_fits: HashMap<u32, u32>,
}

impl Resources {
    fn new(cpu_total: u32, memory_total: u64) -> Self {
        Self {
            cpu_total,
            memory_total,
            cpu_available: cpu_total,
            memory_available: memory_total,
            type_fits: HashMap::new(),
        }
    }

    fn claim(&mut self, cpu: u32, memory: u64) {
        self.cpu_available -= cpu;
        self.memory_available -= memory;
        self.type_fits.clear();
    }

    fn release(&mut self, cpu: u32, memory: u64) {
        self.cpu_available += cpu;
        self.memory_available += memory;
        self.type_fits.clear();
    }

    pub fn has_capacity(&self, cpu: u32, memory: u64) -> bool {
        self.cpu_available >= cpu && self.memory_available >= memory
    }

    /// The worse of the two utilisation ratios, in [0, 1].
    pub fn load(&self) -> f64 {
        let cpu_load = (self.cpu_total - self.cpu_available) as f64 / self.cpu_total as f64;
        let memory_load =
            (self.memory_total - self.memory_available) as f64 / self.memory_total as f64;
        cpu_load.max(memory_load)
    }

    fn cached_fit(&self, type_index: u32) -> Option<u32> {
        self.type_fits.get(&type_index).copied()
    }

    fn store_fit(&mut self, type_index: u32, fit: u32) {
        self.type_fits.insert(type_index, fit);
    }
}

/// The scheduling leaf: a single (cpu, memory) bin.
#[derive(Debug, Clone)]
pub struct NumaNode {
    pub resources: Resources,
}

impl NumaNode {
    fn new(cpu: u32, memory: u64) -> Self {
        Self {
            resources: Resources::new(cpu, memory),
        }
    }

    /// Number of additional per-node slices of `ty` this node can hold.
    pub fn type_fit(&mut self, ty: &VmType) -> u32 {
        if let Some(fit) = self.resources.cached_fit(ty.index) {
            return fit;
        }
        let by_cpu = (self.resources.cpu_available / ty.cpu) as u64;
        let by_memory = self.resources.memory_available / ty.memory;
        let fit = by_cpu.min(by_memory) as u32;
        self.resources.store_fit(ty.index, fit);
        fit
    }
}

/// A physical machine: a sequence of NUMA nodes plus the per-group count of
/// VMs homed on it, kept for O(1) soft per-PM anti-affinity checks.
#[derive(Debug, Clone)]
pub struct PhysicalMachine {
    pub resources: Resources,
    pub nodes: Vec<NumaNode>,
    pub vms_by_group: HashMap<u32, u32>,
}

impl PhysicalMachine {
    fn new(node_cpu: &[u32], node_memory: &[u64]) -> Self {
        let nodes: Vec<NumaNode> = node_cpu
            .iter()
            .zip(node_memory.iter())
            .map(|(&cpu, &memory)| NumaNode::new(cpu, memory))
            .collect();
        Self {
            resources: Resources::new(node_cpu.iter().sum(), node_memory.iter().sum()),
            nodes,
            vms_by_group: HashMap::new(),
        }
    }

    /// Upper bound on additional VMs of `ty` this PM can host. Each VM needs
    /// `ty.nodes` distinct nodes, so the per-node fits are sorted ascending
    /// and every `ty.nodes`-th entry is summed.
    pub fn type_fit(&mut self, ty: &VmType) -> u32 {
        if let Some(fit) = self.resources.cached_fit(ty.index) {
            return fit;
        }
        let mut by_node: Vec<u32> = self.nodes.iter_mut().map(|node| node.type_fit(ty)).collect();
        by_node.sort_unstable();
        let fit = by_node.iter().step_by(ty.nodes as usize).sum();
        self.resources.store_fit(ty.index, fit);
        fit
    }

    /// Number of VMs of the given placement group homed on this PM.
    pub fn group_count(&self, group: u32) -> u32 {
        self.vms_by_group.get(&group).copied().unwrap_or(0)
    }
}

/// A rack: a sequence of PMs within one domain.
#[derive(Debug, Clone)]
pub struct Rack {
    pub resources: Resources,
    pub pms: Vec<PhysicalMachine>,
}

impl Rack {
    fn new(pm_count: usize, node_cpu: &[u32], node_memory: &[u64]) -> Self {
        let pms: Vec<PhysicalMachine> = (0..pm_count)
            .map(|_| PhysicalMachine::new(node_cpu, node_memory))
            .collect();
        Self {
            resources: Resources::new(
                pm_count as u32 * node_cpu.iter().sum::<u32>(),
                pm_count as u64 * node_memory.iter().sum::<u64>(),
            ),
            pms,
        }
    }

    pub fn type_fit(&mut self, ty: &VmType) -> u32 {
        if let Some(fit) = self.resources.cached_fit(ty.index) {
            return fit;
        }
        let fit = self.pms.iter_mut().map(|pm| pm.type_fit(ty)).sum();
        self.resources.store_fit(ty.index, fit);
        fit
    }
}

/// A domain: the top-level failure boundary, a sequence of racks.
#[derive(Debug, Clone)]
pub struct Domain {
    pub resources: Resources,
    pub racks: Vec<Rack>,
}

impl Domain {
    fn new(rack_count: usize, pm_count: usize, node_cpu: &[u32], node_memory: &[u64]) -> Self {
        let racks: Vec<Rack> = (0..rack_count)
            .map(|_| Rack::new(pm_count, node_cpu, node_memory))
            .collect();
        Self {
            resources: Resources::new(
                (rack_count * pm_count) as u32 * node_cpu.iter().sum::<u32>(),
                (rack_count * pm_count) as u64 * node_memory.iter().sum::<u64>(),
            ),
            racks,
        }
    }

    pub fn type_fit(&mut self, ty: &VmType) -> u32 {
        if let Some(fit) = self.resources.cached_fit(ty.index) {
            return fit;
        }
        let fit = self.racks.iter_mut().map(|rack| rack.type_fit(ty)).sum();
        self.resources.store_fit(ty.index, fit);
        fit
    }
}

/// Static fleet description from the session header. Every PM carries the
/// same node templates.
#[derive(Debug, Clone)]
pub struct FleetLayout {
    pub domains: usize,
    pub racks_per_domain: usize,
    pub pms_per_rack: usize,
    pub node_cpu: Vec<u32>,
    pub node_memory: Vec<u64>,
}

/// The four-level fleet topology, built once per session and never mutated
/// structurally. All resource mutation goes through `place_vm`/`unplace_vm`.
#[derive(Debug, Clone)]
pub struct ResourcePoolState {
    domains: Vec<Domain>,
}

impl ResourcePoolState {
    pub fn new(layout: &FleetLayout) -> Self {
        let domains = (0..layout.domains)
            .map(|_| {
                Domain::new(
                    layout.racks_per_domain,
                    layout.pms_per_rack,
                    &layout.node_cpu,
                    &layout.node_memory,
                )
            })
            .collect();
        Self { domains }
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn domain(&self, index: usize) -> &Domain {
        &self.domains[index]
    }

    pub fn domain_mut(&mut self, index: usize) -> &mut Domain {
        &mut self.domains[index]
    }

    pub fn rack(&self, addr: RackAddr) -> &Rack {
        &self.domains[addr.domain].racks[addr.rack]
    }

    pub fn rack_mut(&mut self, addr: RackAddr) -> &mut Rack {
        &mut self.domains[addr.domain].racks[addr.rack]
    }

    pub fn pm(&self, addr: PmAddr) -> &PhysicalMachine {
        &self.domains[addr.domain].racks[addr.rack].pms[addr.pm]
    }

    pub fn pm_mut(&mut self, addr: PmAddr) -> &mut PhysicalMachine {
        &mut self.domains[addr.domain].racks[addr.rack].pms[addr.pm]
    }

    pub fn node(&self, addr: NodeAddr) -> &NumaNode {
        &self.domains[addr.domain].racks[addr.rack].pms[addr.pm].nodes[addr.node]
    }

    pub fn node_mut(&mut self, addr: NodeAddr) -> &mut NumaNode {
        &mut self.domains[addr.domain].racks[addr.rack].pms[addr.pm].nodes[addr.node]
    }

    /// All rack addresses in index order.
    pub fn racks(&self) -> Vec<RackAddr> {
        let mut result = Vec::new();
        for (domain, state) in self.domains.iter().enumerate() {
            for rack in 0..state.racks.len() {
                result.push(RackAddr { domain, rack });
            }
        }
        result
    }

    /// Rack addresses of one domain in index order.
    pub fn domain_racks(&self, domain: usize) -> Vec<RackAddr> {
        (0..self.domains[domain].racks.len())
            .map(|rack| RackAddr { domain, rack })
            .collect()
    }

    /// Claims the given nodes for the VM. Feasibility must be confirmed
    /// before calling; the claim itself never fails. Charges the per-node
    /// demand at all four levels for every node and bumps the home PM's
    /// group counter.
    pub fn place_vm(&mut self, vm: &mut VirtualMachine, ty: &VmType, nodes: Vec<NodeAddr>) {
        debug_assert_eq!(nodes.len(), ty.nodes as usize);
        for &addr in &nodes {
            self.node_mut(addr).resources.claim(ty.cpu, ty.memory);
            self.pm_mut(addr.pm()).resources.claim(ty.cpu, ty.memory);
            self.rack_mut(addr.rack()).resources.claim(ty.cpu, ty.memory);
            self.domain_mut(addr.domain).resources.claim(ty.cpu, ty.memory);
        }
        let home = nodes[0].pm();
        *self.pm_mut(home).vms_by_group.entry(vm.group).or_insert(0) += 1;
        vm.nodes = nodes;
    }

    /// Exact inverse of `place_vm`. A no-op for an unplaced VM.
    pub fn unplace_vm(&mut self, vm: &mut VirtualMachine, ty: &VmType) {
        let nodes = std::mem::take(&mut vm.nodes);
        for &addr in &nodes {
            self.node_mut(addr).resources.release(ty.cpu, ty.memory);
            self.pm_mut(addr.pm()).resources.release(ty.cpu, ty.memory);
            self.rack_mut(addr.rack()).resources.release(ty.cpu, ty.memory);
            self.domain_mut(addr.domain).resources.release(ty.cpu, ty.memory);
        }
        if let Some(&first) = nodes.first() {
            let pm = self.pm_mut(first.pm());
            if let Some(count) = pm.vms_by_group.get_mut(&vm.group) {
                *count -= 1;
                if *count == 0 {
                    pm.vms_by_group.remove(&vm.group);
                }
            }
        }
    }
}
