//! Parsed request records and the whitespace-delimited integer reader.
//!
//! The reader enforces structural validity only: every token must be an
//! integer and the stream must not end mid-record. Semantic validity
//! (indices resolving to known entities) is a precondition of the
//! scheduler.

use std::io::BufRead;

use crate::core::common::Affinity;
use crate::core::resource_pool::FleetLayout;
use crate::core::vm::VmType;

/// A single administrative request, already parsed.
#[derive(Debug, Clone)]
pub enum Request {
    /// Registers a placement group (request kind 1).
    CreateGroup {
        index: u32,
        rack_partitions: u32,
        soft_pm_limit: u32,
        domain_affinity: Affinity,
        rack_affinity: Affinity,
    },
    /// Creates a batch of VMs (request kind 2). `partition` is -1 for
    /// one-VM-per-partition, otherwise the shared partition id.
    CreateVms {
        type_index: u32,
        group_index: u32,
        partition: i64,
        indices: Vec<u32>,
    },
    /// Deletes a batch of VMs (request kind 3).
    DeleteVms { indices: Vec<u32> },
    /// Ends the session (request kind 4).
    Terminate,
}

/// Streaming reader of whitespace-delimited integers.
pub struct RequestReader<R> {
    input: R,
    tokens: Vec<String>,
    position: usize,
}

impl<R: BufRead> RequestReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            tokens: Vec::new(),
            position: 0,
        }
    }

    fn next_int(&mut self) -> i64 {
        while self.position == self.tokens.len() {
            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .expect("failed to read the request stream");
            if read == 0 {
                panic!("request stream ended unexpectedly");
            }
            self.tokens = line.split_whitespace().map(str::to_string).collect();
            self.position = 0;
        }
        self.position += 1;
        let token = &self.tokens[self.position - 1];
        token
            .parse()
            .unwrap_or_else(|_| panic!("expected an integer, got {:?}", token))
    }

    /// Reads the fleet header: dimensions and the per-PM node templates.
    pub fn read_layout(&mut self) -> FleetLayout {
        let domains = self.next_int() as usize;
        let racks_per_domain = self.next_int() as usize;
        let pms_per_rack = self.next_int() as usize;
        let node_count = self.next_int() as usize;
        let mut node_cpu = Vec::with_capacity(node_count);
        let mut node_memory = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            node_cpu.push(self.next_int() as u32);
            node_memory.push(self.next_int() as u64);
        }
        FleetLayout {
            domains,
            racks_per_domain,
            pms_per_rack,
            node_cpu,
            node_memory,
        }
    }

    /// Reads the VM type table that follows the fleet header.
    pub fn read_types(&mut self) -> Vec<VmType> {
        let count = self.next_int() as usize;
        let mut types = Vec::with_capacity(count);
        for position in 0..count {
            let nodes = self.next_int() as u32;
            let cpu = self.next_int() as u32;
            let memory = self.next_int() as u64;
            types.push(VmType::new((position + 1) as u32, nodes, cpu, memory));
        }
        types
    }

    /// Reads the next request record.
    pub fn read_request(&mut self) -> Request {
        match self.next_int() {
            1 => Request::CreateGroup {
                index: self.next_int() as u32,
                rack_partitions: self.next_int() as u32,
                soft_pm_limit: self.next_int() as u32,
                domain_affinity: Affinity::from_code(self.next_int() as u32),
                rack_affinity: Affinity::from_code(self.next_int() as u32),
            },
            2 => {
                let count = self.next_int() as usize;
                let type_index = self.next_int() as u32;
                let group_index = self.next_int() as u32;
                let partition = self.next_int();
                let indices = (0..count).map(|_| self.next_int() as u32).collect();
                Request::CreateVms {
                    type_index,
                    group_index,
                    partition,
                    indices,
                }
            }
            3 => {
                let count = self.next_int() as usize;
                let indices = (0..count).map(|_| self.next_int() as u32).collect();
                Request::DeleteVms { indices }
            }
            4 => Request::Terminate,
            kind => panic!("unknown request kind {}", kind),
        }
    }
}
