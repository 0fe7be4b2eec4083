//! VM flavours and live virtual machine records.

use crate::core::common::{NodeAddr, PmAddr};

/// A VM flavour: how many NUMA nodes a VM occupies and the cpu/memory cost
/// of each occupied node. All nodes of one VM are co-located on a single PM.
#[derive(Debug, Clone)]
pub struct VmType {
    pub index: u32,
    pub nodes: u32,
    pub cpu: u32,
    pub memory: u64,
}

impl VmType {
    pub fn new(index: u32, nodes: u32, cpu: u32, memory: u64) -> Self {
        Self {
            index,
            nodes,
            cpu,
            memory,
        }
    }

    /// Whole-VM CPU demand, as seen at PM granularity and above.
    pub fn pm_cpu(&self) -> u32 {
        self.nodes * self.cpu
    }

    /// Whole-VM memory demand, as seen at PM granularity and above.
    pub fn pm_memory(&self) -> u64 {
        self.nodes as u64 * self.memory
    }
}

/// A live virtual machine. `nodes` is empty until the VM is placed;
/// otherwise it holds exactly `type.nodes` node addresses sharing one PM,
/// and the first entry's PM is the VM's home PM.
#[derive(Debug, Clone)]
pub struct VirtualMachine {
    pub index: u32,
    /// 1-based index into the session type table.
    pub type_index: u32,
    pub group: u32,
    pub partition: u32,
    pub nodes: Vec<NodeAddr>,
}

impl VirtualMachine {
    pub fn new(index: u32, type_index: u32, group: u32, partition: u32) -> Self {
        Self {
            index,
            type_index,
            group,
            partition,
            nodes: Vec::new(),
        }
    }

    pub fn is_placed(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// The PM this VM is charged to in the per-group PM counters.
    pub fn home_pm(&self) -> Option<PmAddr> {
        self.nodes.first().map(|node| node.pm())
    }
}
