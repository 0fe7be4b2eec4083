//! The main entry point for a placement session.
//!
//! Wires the request reader, the scheduler and the output stream together
//! and drives one monotone session: `Running` until a terminate request, an
//! infeasible creation or an exhausted time budget flips it to `Terminated`.

use std::io::{BufRead, Write};

use log::{debug, info};

use crate::core::config::EngineConfig;
use crate::core::logger::PlacementLog;
use crate::core::requests::{Request, RequestReader};
use crate::core::scheduler::Scheduler;

/// Session state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Terminated,
}

pub struct PlacementEngine {
    scheduler: Scheduler,
    log: PlacementLog,
    state: SessionState,
    requests: u32,
}

impl PlacementEngine {
    /// Creates the engine by reading the fleet header and the type table
    /// from the session stream.
    pub fn from_reader<R: BufRead>(input: &mut RequestReader<R>, config: EngineConfig) -> Self {
        let layout = input.read_layout();
        let types = input.read_types();
        debug!(
            "fleet: {} domains x {} racks x {} pms x {} nodes, {} vm types",
            layout.domains,
            layout.racks_per_domain,
            layout.pms_per_rack,
            layout.node_cpu.len(),
            types.len()
        );
        Self {
            scheduler: Scheduler::new(&layout, types, config),
            log: PlacementLog::new(),
            state: SessionState::Running,
            requests: 0,
        }
    }

    /// Processes requests until termination. Locations of a successful
    /// creation are written after the batch commits, one line per VM in
    /// input order; a failed creation writes the `-1` sentinel and ends the
    /// session.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: &mut RequestReader<R>,
        output: &mut W,
    ) -> std::io::Result<SessionState> {
        while self.state == SessionState::Running {
            let request = input.read_request();
            self.requests += 1;
            match request {
                Request::CreateGroup {
                    index,
                    rack_partitions,
                    soft_pm_limit,
                    domain_affinity,
                    rack_affinity,
                } => {
                    debug!(
                        "request {}: create group {} (partitions {}, pm limit {}, affinity {:?}/{:?})",
                        self.requests, index, rack_partitions, soft_pm_limit, domain_affinity, rack_affinity
                    );
                    self.scheduler
                        .create_group(index, rack_partitions, soft_pm_limit, domain_affinity, rack_affinity);
                }
                Request::CreateVms {
                    type_index,
                    group_index,
                    partition,
                    indices,
                } => {
                    debug!(
                        "request {}: create {} vms of type {} in group {} (partition {})",
                        self.requests,
                        indices.len(),
                        type_index,
                        group_index,
                        partition
                    );
                    match self.scheduler.create_vms(&indices, type_index, group_index, partition) {
                        Ok(placements) => {
                            for placement in &placements {
                                self.log.record(self.requests, group_index, placement);
                                writeln!(output, "{}", placement)?;
                            }
                        }
                        Err(error) => {
                            info!("request {}: {}, terminating", self.requests, error);
                            writeln!(output, "-1")?;
                            self.state = SessionState::Terminated;
                        }
                    }
                }
                Request::DeleteVms { indices } => {
                    debug!("request {}: delete {} vms", self.requests, indices.len());
                    self.scheduler.delete_vms(&indices);
                }
                Request::Terminate => {
                    debug!("request {}: terminate", self.requests);
                    self.state = SessionState::Terminated;
                }
            }
        }
        output.flush()?;
        Ok(self.state)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn placement_log(&self) -> &PlacementLog {
        &self.log
    }
}
