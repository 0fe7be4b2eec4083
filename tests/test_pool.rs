use fleet_place::core::common::{NodeAddr, PmAddr, RackAddr};
use fleet_place::core::resource_pool::{FleetLayout, ResourcePoolState};
use fleet_place::core::vm::{VirtualMachine, VmType};

fn layout(
    domains: usize,
    racks_per_domain: usize,
    pms_per_rack: usize,
    nodes: Vec<(u32, u64)>,
) -> FleetLayout {
    FleetLayout {
        domains,
        racks_per_domain,
        pms_per_rack,
        node_cpu: nodes.iter().map(|&(cpu, _)| cpu).collect(),
        node_memory: nodes.iter().map(|&(_, memory)| memory).collect(),
    }
}

fn node(domain: usize, rack: usize, pm: usize, node: usize) -> NodeAddr {
    NodeAddr {
        domain,
        rack,
        pm,
        node,
    }
}

#[test]
// Non-leaf totals are the sums of their descendants' totals.
fn test_capacity_aggregation() {
    let pool = ResourcePoolState::new(&layout(2, 2, 2, vec![(4, 8), (4, 8)]));

    let pm = pool.pm(PmAddr {
        domain: 0,
        rack: 0,
        pm: 0,
    });
    assert_eq!(pm.resources.cpu_total, 8);
    assert_eq!(pm.resources.memory_total, 16);

    let rack = pool.rack(RackAddr { domain: 0, rack: 0 });
    assert_eq!(rack.resources.cpu_total, 16);
    assert_eq!(rack.resources.memory_total, 32);

    assert_eq!(pool.domain(0).resources.cpu_total, 32);
    assert_eq!(pool.domain(0).resources.memory_total, 64);
    assert_eq!(pool.domain_count(), 2);
    assert_eq!(pool.racks().len(), 4);
}

#[test]
// Placing a two-node VM charges the per-node demand at all four levels and
// unplacing restores every level exactly.
fn test_place_unplace_roundtrip() {
    let mut pool = ResourcePoolState::new(&layout(1, 1, 1, vec![(4, 8), (4, 8)]));
    let ty = VmType::new(1, 2, 2, 4);
    let mut vm = VirtualMachine::new(1, 1, 7, 0);

    pool.place_vm(&mut vm, &ty, vec![node(0, 0, 0, 0), node(0, 0, 0, 1)]);
    assert!(vm.is_placed());

    assert_eq!(pool.node(node(0, 0, 0, 0)).resources.cpu_available, 2);
    assert_eq!(pool.node(node(0, 0, 0, 1)).resources.memory_available, 4);
    let pm = pool.pm(PmAddr {
        domain: 0,
        rack: 0,
        pm: 0,
    });
    assert_eq!(pm.resources.cpu_available, 4);
    assert_eq!(pm.resources.memory_available, 8);
    assert_eq!(pm.group_count(7), 1);
    assert_eq!(pool.rack(RackAddr { domain: 0, rack: 0 }).resources.cpu_available, 4);
    assert_eq!(pool.domain(0).resources.memory_available, 8);

    pool.unplace_vm(&mut vm, &ty);
    assert!(!vm.is_placed());

    assert_eq!(pool.node(node(0, 0, 0, 0)).resources.cpu_available, 4);
    assert_eq!(pool.domain(0).resources.cpu_available, 8);
    assert_eq!(pool.domain(0).resources.memory_available, 16);
    let pm = pool.pm(PmAddr {
        domain: 0,
        rack: 0,
        pm: 0,
    });
    assert_eq!(pm.group_count(7), 0);
}

#[test]
// A node fits as many slices as both of its resources allow; a PM sums
// every `nodes`-th entry of the ascending per-node fits.
fn test_type_fit() {
    let mut pool = ResourcePoolState::new(&layout(1, 1, 1, vec![(4, 8), (4, 8)]));
    let single = VmType::new(1, 1, 2, 4);
    let double = VmType::new(2, 2, 2, 4);

    assert_eq!(pool.node_mut(node(0, 0, 0, 0)).type_fit(&single), 2);

    let pm = PmAddr {
        domain: 0,
        rack: 0,
        pm: 0,
    };
    assert_eq!(pool.pm_mut(pm).type_fit(&single), 4);
    assert_eq!(pool.pm_mut(pm).type_fit(&double), 2);
    assert_eq!(pool.rack_mut(RackAddr { domain: 0, rack: 0 }).type_fit(&single), 4);
    assert_eq!(pool.domain_mut(0).type_fit(&single), 4);
}

#[test]
// The memoised fit is dropped when the level's availability changes.
fn test_type_fit_tracks_placements() {
    let mut pool = ResourcePoolState::new(&layout(1, 1, 1, vec![(4, 8), (4, 8)]));
    let ty = VmType::new(1, 1, 2, 4);
    let pm = PmAddr {
        domain: 0,
        rack: 0,
        pm: 0,
    };
    assert_eq!(pool.pm_mut(pm).type_fit(&ty), 4);

    let mut vm = VirtualMachine::new(1, 1, 1, 0);
    pool.place_vm(&mut vm, &ty, vec![node(0, 0, 0, 0)]);
    assert_eq!(pool.pm_mut(pm).type_fit(&ty), 3);

    pool.unplace_vm(&mut vm, &ty);
    assert_eq!(pool.pm_mut(pm).type_fit(&ty), 4);
}

#[test]
// Load is the worse of the two utilisation ratios.
fn test_load_is_worst_ratio() {
    let mut pool = ResourcePoolState::new(&layout(1, 1, 1, vec![(4, 8), (4, 8)]));
    let ty = VmType::new(1, 1, 2, 2);
    let mut vm = VirtualMachine::new(1, 1, 1, 0);
    pool.place_vm(&mut vm, &ty, vec![node(0, 0, 0, 0)]);

    assert_eq!(pool.node(node(0, 0, 0, 0)).resources.load(), 0.5);
    assert_eq!(pool.rack(RackAddr { domain: 0, rack: 0 }).resources.load(), 0.25);
}
