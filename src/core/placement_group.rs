//! Placement groups and their derived affinity state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::common::{Affinity, RackAddr};
use crate::core::vm::VirtualMachine;

/// A named constraint bundle plus its member VMs.
///
/// The derived fields (`target_*`, `*_possible`, `partition_racks`,
/// `soft_pm_limit_active`) are recomputed from the placed members by
/// `refresh_targets` and are only valid until the next place or unplace of
/// a member.
#[derive(Debug, Clone)]
pub struct PlacementGroup {
    pub index: u32,
    /// Number of hard rack anti-affinity partitions; 0 disables the rule.
    pub rack_partitions: u32,
    /// Soft cap on member VMs homed on one PM; 0 disables the rule.
    pub soft_pm_limit: u32,
    pub domain_affinity: Affinity,
    pub rack_affinity: Affinity,
    /// Member VM indices in creation order.
    pub vms: Vec<u32>,

    /// The unique domain hosting placed members, if consistent.
    pub target_domain: Option<usize>,
    pub domain_affinity_possible: bool,
    /// The unique rack hosting placed members, if consistent.
    pub target_rack: Option<RackAddr>,
    pub rack_affinity_possible: bool,
    pub soft_pm_limit_active: bool,
    /// Racks currently hosting members, per partition id.
    pub partition_racks: BTreeMap<u32, BTreeSet<RackAddr>>,
}

impl PlacementGroup {
    pub fn new(
        index: u32,
        rack_partitions: u32,
        soft_pm_limit: u32,
        domain_affinity: Affinity,
        rack_affinity: Affinity,
    ) -> Self {
        // a single partition is the same as no partitioning
        let rack_partitions = if rack_partitions <= 1 { 0 } else { rack_partitions };
        Self {
            index,
            rack_partitions,
            soft_pm_limit,
            domain_affinity,
            rack_affinity,
            vms: Vec::new(),
            target_domain: None,
            domain_affinity_possible: true,
            target_rack: None,
            rack_affinity_possible: true,
            soft_pm_limit_active: soft_pm_limit > 0,
            partition_racks: BTreeMap::new(),
        }
    }

    /// Recomputes the derived state from the currently placed members.
    /// Linear in the member count.
    pub fn refresh_targets(&mut self, vms: &HashMap<u32, VirtualMachine>) {
        self.target_domain = None;
        self.domain_affinity_possible = true;
        self.target_rack = None;
        self.rack_affinity_possible = true;
        self.partition_racks.clear();

        for index in &self.vms {
            let vm = &vms[index];
            let Some(home) = vm.home_pm() else {
                continue;
            };
            let rack = home.rack();

            if self.domain_affinity != Affinity::None && self.domain_affinity_possible {
                match self.target_domain {
                    None => self.target_domain = Some(rack.domain),
                    Some(domain) if domain != rack.domain => {
                        self.domain_affinity_possible = false;
                    }
                    _ => {}
                }
            }

            if self.rack_affinity != Affinity::None && self.rack_affinity_possible {
                match self.target_rack {
                    None => self.target_rack = Some(rack),
                    Some(target) if target != rack => self.rack_affinity_possible = false,
                    _ => {}
                }
            }

            if self.rack_partitions > 0 {
                self.partition_racks.entry(vm.partition).or_default().insert(rack);
            }
        }

        // a lost SOFT affinity also retires the weaker soft per-PM rule
        if (self.domain_affinity == Affinity::Soft && !self.domain_affinity_possible)
            || (self.rack_affinity == Affinity::Soft && !self.rack_affinity_possible)
        {
            self.domain_affinity_possible = false;
            self.rack_affinity_possible = false;
            self.soft_pm_limit_active = false;
        } else {
            self.soft_pm_limit_active = self.soft_pm_limit > 0;
        }
    }
}
