//! Trace of committed placement decisions with CSV export.

use std::fs::File;

use serde::Serialize;

use crate::core::scheduler::VmPlacement;

#[derive(Serialize)]
struct PlacementRecord {
    request: u32,
    vm: u32,
    group: u32,
    domain: u32,
    rack: u32,
    pm: u32,
    nodes: String,
}

/// Collects every committed placement of a session.
#[derive(Default)]
pub struct PlacementLog {
    records: Vec<PlacementRecord>,
}

impl PlacementLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, request: u32, group: u32, placement: &VmPlacement) {
        self.records.push(PlacementRecord {
            request,
            vm: placement.vm,
            group,
            domain: placement.domain,
            rack: placement.rack,
            pm: placement.pm,
            nodes: placement
                .nodes
                .iter()
                .map(|node| node.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn save(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
