//! Candidate rack-group enumeration.
//!
//! For every creation batch the scheduler attempts placement on an ordered
//! sequence of rack groups. A group is an ordered list of racks tried as a
//! unit; any group produced here satisfies the hard affinity constraints if
//! the whole batch fits on it. Groups are emitted from most to least
//! preferred: affinity targets first, then load-preferred alternatives,
//! finally the all-racks catch-all for the soft cases.

use crate::core::common::{Affinity, RackAddr};
use crate::core::placement_group::PlacementGroup;
use crate::core::resource_pool::ResourcePoolState;
use crate::core::vm::VmType;

pub fn candidate_groups(
    pool: &mut ResourcePoolState,
    group: &PlacementGroup,
    ty: &VmType,
    batch_len: usize,
) -> Vec<Vec<RackAddr>> {
    let mut groups = Vec::new();

    if group.rack_affinity == Affinity::Hard {
        if let Some(rack) = group.target_rack {
            groups.push(vec![rack]);
        } else {
            // any single rack able to host the whole batch, one group each
            let mut fitting: Vec<RackAddr> = pool
                .racks()
                .into_iter()
                .filter(|&rack| pool.rack_mut(rack).type_fit(ty) as usize >= batch_len)
                .collect();
            sort_by_load(pool, &mut fitting);
            groups.extend(fitting.into_iter().map(|rack| vec![rack]));
        }
        return groups;
    }

    let rack_affinity_open = group.rack_affinity == Affinity::Soft && group.rack_affinity_possible;
    let domain_affinity_open =
        group.domain_affinity == Affinity::Soft && group.domain_affinity_possible;

    if group.domain_affinity == Affinity::Hard {
        if rack_affinity_open {
            if let Some(rack) = group.target_rack {
                groups.push(vec![rack]);
            }
        }
        let mut alternatives = match group.target_domain {
            Some(domain) => vec![sorted_domain(pool, domain)],
            None => fitting_domain_groups(pool, ty, batch_len),
        };
        sort_groups_by_head_load(pool, &mut alternatives);
        groups.extend(alternatives);
        return groups;
    }

    if domain_affinity_open {
        if rack_affinity_open {
            if let Some(rack) = group.target_rack {
                groups.push(vec![rack]);
            }
        }
        if let Some(domain) = group.target_domain {
            groups.push(sorted_domain(pool, domain));
        }
        let mut alternatives = Vec::new();
        for domain in 0..pool.domain_count() {
            if Some(domain) == group.target_domain {
                continue;
            }
            alternatives.push(sorted_domain(pool, domain));
        }
        sort_groups_by_head_load(pool, &mut alternatives);
        groups.extend(alternatives);
        groups.push(all_racks_sorted(pool));
        return groups;
    }

    // no affinity left to honour: one least-loaded-first group over the fleet
    groups.push(all_racks_sorted(pool));
    groups
}

fn rack_load(pool: &ResourcePoolState, addr: RackAddr) -> f64 {
    pool.rack(addr).resources.load()
}

fn sort_by_load(pool: &ResourcePoolState, racks: &mut [RackAddr]) {
    racks.sort_by(|a, b| rack_load(pool, *a).total_cmp(&rack_load(pool, *b)));
}

fn sorted_domain(pool: &ResourcePoolState, domain: usize) -> Vec<RackAddr> {
    let mut racks = pool.domain_racks(domain);
    sort_by_load(pool, &mut racks);
    racks
}

fn all_racks_sorted(pool: &ResourcePoolState) -> Vec<RackAddr> {
    let mut racks = pool.racks();
    sort_by_load(pool, &mut racks);
    racks
}

/// One group per domain whose aggregate type-fit covers the batch.
fn fitting_domain_groups(
    pool: &mut ResourcePoolState,
    ty: &VmType,
    batch_len: usize,
) -> Vec<Vec<RackAddr>> {
    let mut result = Vec::new();
    for domain in 0..pool.domain_count() {
        if (pool.domain_mut(domain).type_fit(ty) as usize) < batch_len {
            continue;
        }
        result.push(sorted_domain(pool, domain));
    }
    result
}

fn sort_groups_by_head_load(pool: &ResourcePoolState, groups: &mut [Vec<RackAddr>]) {
    groups.sort_by(|a, b| rack_load(pool, a[0]).total_cmp(&rack_load(pool, b[0])));
}
