use fleet_place::core::config::EngineConfig;
use fleet_place::core::requests::RequestReader;
use fleet_place::engine::{PlacementEngine, SessionState};

fn run_session_with(input: &str, config: EngineConfig) -> (String, SessionState) {
    let mut reader = RequestReader::new(input.as_bytes());
    let mut engine = PlacementEngine::from_reader(&mut reader, config);
    let mut output = Vec::new();
    let state = engine.run(&mut reader, &mut output).unwrap();
    (String::from_utf8(output).unwrap(), state)
}

fn run_session(input: &str) -> String {
    run_session_with(input, EngineConfig::default()).0
}

#[test]
// Create, delete, create again: the released slot is reused and the session
// ends cleanly on the terminate request.
fn test_create_delete_create_session() {
    let input = "\
1 1 1 2
4 8 4 8
1
1 2 4
1 1 0 0 0 0
2 1 1 1 -1 1
3 1 1
2 1 1 1 -1 2
4
";
    let (output, state) = run_session_with(input, EngineConfig::default());
    assert_eq!(output, "1 1 1 1\n1 1 1 1\n");
    assert_eq!(state, SessionState::Terminated);
}

#[test]
// Two (4, 8) nodes hold four VMs of demand (2, 4); the fifth creation emits
// the failure sentinel and ends the session.
fn test_capacity_exhaustion_emits_sentinel() {
    let input = "\
1 1 1 2
4 8 4 8
1
1 2 4
1 1 0 0 0 0
2 1 1 1 -1 1
2 1 1 1 -1 2
2 1 1 1 -1 3
2 1 1 1 -1 4
2 1 1 1 -1 5
";
    let (output, state) = run_session_with(input, EngineConfig::default());
    assert_eq!(output, "1 1 1 1\n1 1 1 2\n1 1 1 1\n1 1 1 2\n-1\n");
    assert_eq!(state, SessionState::Terminated);
}

#[test]
// Auto-assigned partitions of one batch land on distinct racks.
fn test_partitioned_batch_session() {
    let input = "\
2 2 1 1
8 8
1
1 1 1
1 1 2 0 0 0
2 2 1 1 -1 1 2
4
";
    let output = run_session(input);
    let locations: Vec<Vec<u32>> = output
        .lines()
        .map(|line| line.split_whitespace().map(|token| token.parse().unwrap()).collect())
        .collect();
    assert_eq!(locations.len(), 2);
    assert_ne!(
        (locations[0][0], locations[0][1]),
        (locations[1][0], locations[1][1])
    );
}

#[test]
// Hard domain affinity keeps the second batch in the first batch's domain.
fn test_hard_domain_affinity_session() {
    let input = "\
2 2 1 1
4 4
1
1 1 1
1 1 0 0 2 0
2 1 1 1 0 1
2 1 1 1 0 2
4
";
    let output = run_session(input);
    let domains: Vec<&str> = output
        .lines()
        .map(|line| line.split_whitespace().next().unwrap())
        .collect();
    assert_eq!(domains.len(), 2);
    assert_eq!(domains[0], domains[1]);
}

#[test]
// The soft per-PM cap does not make the only PM infeasible.
fn test_soft_pm_limit_session() {
    let input = "\
1 1 1 1
8 8
1
1 1 1
1 1 0 1 0 0
2 3 1 1 0 1 2 3
4
";
    let output = run_session(input);
    assert_eq!(output, "1 1 1 1\n1 1 1 1\n1 1 1 1\n");
}

#[test]
// The same input stream produces byte-identical output streams.
fn test_sessions_are_deterministic() {
    let input = "\
2 2 2 2
4 8 4 8
2
1 2 4
2 1 2
1 1 0 0 1 1
1 2 3 2 0 0
2 4 1 1 0 11 12 13 14
2 3 2 2 -1 21 22 23
2 2 1 1 0 15 16
3 2 12 21
2 2 2 2 -1 24 25
4
";
    assert_eq!(run_session(input), run_session(input));
}

#[test]
// A zero budget refuses the first creation.
fn test_zero_budget_terminates() {
    let input = "\
1 1 1 1
8 8
1
1 1 1
1 1 0 0 0 0
2 1 1 1 0 1
";
    let config = EngineConfig {
        time_budget: 0.,
        ..EngineConfig::default()
    };
    let (output, state) = run_session_with(input, config);
    assert_eq!(output, "-1\n");
    assert_eq!(state, SessionState::Terminated);
}

#[test]
// Every committed placement of a session is captured in the trace log.
fn test_placement_log_records_commits() {
    let input = "\
1 1 1 2
4 8 4 8
1
1 2 4
1 1 0 0 0 0
2 2 1 1 -1 1 2
4
";
    let mut reader = RequestReader::new(input.as_bytes());
    let mut engine = PlacementEngine::from_reader(&mut reader, EngineConfig::default());
    let mut output = Vec::new();
    engine.run(&mut reader, &mut output).unwrap();
    assert_eq!(engine.placement_log().len(), 2);
}
