//! End-to-end adaptation runs with scripted solver and remesher.
//!
//! These tests drive `run_adaptation` against a temporary case directory and
//! check the stage tree, the history table, the promoted artifacts and the
//! failure modes of the loop.

use std::fs;
use std::time::Duration;

use meshadapt::bootstrap::{BootstrapBranch, bootstrap, preflight};
use meshadapt::core::bundle::MeshSolutionBundle;
use meshadapt::core::schedule::plan_schedule;
use meshadapt::core::types::{SolverMode, TabularFormat};
use meshadapt::error::AdaptError;
use meshadapt::io::history::HistoryTable;
use meshadapt::io::stage::StageDirs;
use meshadapt::io::{interchange, su2};
use meshadapt::looping::run_adaptation;
use meshadapt::test_support::{
    ADJOINT_COLUMNS, CaseDir, FLOW_COLUMNS, RemeshBehavior, ScriptedRemesher, ScriptedSolver,
    marker_points,
};

const MACH_COLD: &str = r#"
[case]
mesh_filename = "mesh.su2"
mesh_out_filename = "mesh_adapted.su2"
restart_sol = false

[adaptation]
complexity = [1000.0]
sub_iterations = [2]
sensor = "MACH"
"#;

const GOAL_WARM: &str = r#"
[case]
mesh_filename = "mesh.su2"
mesh_out_filename = "mesh_adapted.su2"
restart_filename = "restart_final.csv"
restart_sol = true
solution_filename = "solution_flow.csv"
solution_adj_filename = "solution_adj.csv"

[solver]
iter = 1000

[adaptation]
complexity = [500.0]
sub_iterations = [1]
sensor = "GOAL"
adj_iter = [40]
"#;

const GOAL_COLD_TWO_LEVELS: &str = r#"
[case]
mesh_filename = "mesh.su2"
mesh_out_filename = "mesh_adapted.su2"
restart_sol = false

[solver]
iter = 300
cfl_number = 2.0

[adaptation]
complexity = [800.0, 3200.0]
sub_iterations = [1, 2]
sensor = "GOAL"
flow_iter = [100, 200]
adj_iter = [50, 60]
cfl = [5.0, 10.0]
"#;

fn adaptation_error(err: &anyhow::Error) -> Option<&AdaptError> {
    err.downcast_ref::<AdaptError>()
}

/// The renumbering remesher must not move the wall off `y = 0`.
fn assert_boundary_of_unit_square(mesh: &MeshSolutionBundle) {
    assert_eq!(mesh.marker_tags(), ["wall", "farfield"]);
    assert_eq!(
        marker_points(mesh, "wall"),
        [vec![0.0, 0.0], vec![1.0, 0.0]]
    );
    assert_eq!(
        marker_points(mesh, "farfield"),
        [vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]]
    );
}

/// Cold start, `MACH` sensor, one level with two sub-iterations.
#[test]
fn cold_start_feature_sensor_builds_two_stages() {
    let case = CaseDir::new(MACH_COLD).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let outcome = run_adaptation(&loaded, &solver, &remesher).expect("adaptation");

    assert_eq!(outcome.bootstrap, BootstrapBranch::ColdStart);
    assert_eq!(outcome.stages, 2);
    assert_eq!(
        case.entries("adap").expect("adap"),
        ["history_adap.csv", "ini", "ite0", "ite1"]
    );

    // Header plus one row for ini and one per sub-iteration.
    let history = fs::read_to_string(&outcome.history).expect("history");
    let lines: Vec<&str> = history.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("\"Adap_Iter\",\"Complexity\",\"Vertices\",\"Elements\""));
    assert!(lines[1].starts_with("0,1000,4,2,"));
    assert!(lines[2].starts_with("1,1000,6,6,"));
    assert!(lines[3].starts_with("2,1000,12,18,"));

    // Final artifacts are promoted under the configured names.
    let mesh = su2::read_mesh(&case.path().join("mesh_adapted.su2")).expect("mesh out");
    assert_eq!(mesh.num_vertices(), 12);
    assert_boundary_of_unit_square(&mesh);
    let flow = su2::read_solution(&case.path().join("restart_flow.csv")).expect("flow out");
    assert_eq!(flow.components, FLOW_COLUMNS);
    assert_eq!(flow.rows(), 12);
    assert!(case.path().join("mesh.su2").is_file());

    let ite1 = case.entries("adap/ite1").expect("ite1");
    assert!(ite1.contains(&"flo.json".to_string()));
    assert!(ite1.contains(&"flo_ini.csv".to_string()));
    assert!(!ite1.contains(&"flo.csv".to_string()));
    let exported =
        interchange::read_bundle(&case.path().join("adap/ite1/flo.json")).expect("flo.json");
    assert_eq!(exported.solution_tag(), FLOW_COLUMNS);

    let calls = solver.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|call| call.mode == SolverMode::Direct));
    assert_eq!((calls[0].iterations, calls[0].restart_sol), (1000, false));
    assert!(calls[1].restart_sol && calls[2].restart_sol);
    assert!(calls[2].workdir.ends_with("adap/ite1"));

    let requests = remesher.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|request| request.complexity == 1000));
    assert!(requests[0].background.back.ends_with("adap/ini/amg_back.json"));
    assert_eq!(requests[0].background.flags, ["-nordg"]);
    assert!(remesher.always_saw_driver());
    let workdirs = remesher.workdirs();
    assert!(workdirs[0].ends_with("adap/ini"));
    assert!(workdirs[1].ends_with("adap/ite0"));
}

/// `GOAL` sensor, warm start with the adjoint already on disk.
#[test]
fn warm_goal_start_replays_instead_of_resolving_adjoint() {
    let case = CaseDir::new(GOAL_WARM).expect("case");
    case.write_restart("solution_flow.csv", &FLOW_COLUMNS)
        .expect("flow");
    case.write_restart("solution_adj_cd.csv", &ADJOINT_COLUMNS)
        .expect("adjoint");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let outcome = run_adaptation(&loaded, &solver, &remesher).expect("adaptation");
    assert_eq!(outcome.bootstrap, BootstrapBranch::WarmReplay);
    assert_eq!(outcome.stages, 1);

    let calls = solver.calls();
    let ini_calls: Vec<_> = calls
        .iter()
        .filter(|call| call.workdir.ends_with("adap/ini"))
        .collect();
    assert_eq!(ini_calls.len(), 2);
    assert_eq!(ini_calls[0].mode, SolverMode::Direct);
    assert_eq!(ini_calls[1].mode, SolverMode::DiscreteAdjoint);
    assert!(ini_calls.iter().all(|call| call.iterations == 1 && call.restart_sol));

    // No full-budget adjoint solve was logged during bootstrap.
    let ini_log = fs::read_to_string(case.path().join("adap/ini/log.out")).expect("ini log");
    assert!(ini_log.contains("DISCRETE_ADJOINT solver, 1 iterations"));
    assert!(!ini_log.contains("DISCRETE_ADJOINT solver, 1000 iterations"));

    // The staged stage carries the interpolated adjoint and the new one.
    let ite0 = case.entries("adap/ite0").expect("ite0");
    for name in ["adj_ini_cd.csv", "adj_itp.json", "adj_cd.csv", "flo_itp.json"] {
        assert!(ite0.contains(&name.to_string()), "missing {name} in {ite0:?}");
    }
    let stage_log = fs::read_to_string(case.path().join("adap/ite0/log.out")).expect("stage log");
    assert!(stage_log.contains("DISCRETE_ADJOINT solver, 40 iterations"));

    let interpolated = interchange::read_field(&case.path().join("adap/ite0/adj_itp.json"))
        .expect("adj_itp");
    assert_eq!(interpolated.components, ADJOINT_COLUMNS);
    assert_eq!(interpolated.rows(), 6);

    let history = fs::read_to_string(&outcome.history).expect("history");
    assert!(history.lines().next().expect("header").contains("\"Adj_Inner_Iter\""));
    assert!(case.path().join("restart_final.csv").is_file());
}

#[test]
fn warm_goal_start_without_adjoint_runs_full_adjoint() {
    let case = CaseDir::new(GOAL_WARM).expect("case");
    case.write_restart("solution_flow.csv", &FLOW_COLUMNS)
        .expect("flow");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let outcome = run_adaptation(&loaded, &solver, &remesher).expect("adaptation");
    assert_eq!(outcome.bootstrap, BootstrapBranch::WarmFreshAdjoint);
    let calls = solver.calls();
    assert_eq!(calls[1].mode, SolverMode::DiscreteAdjoint);
    assert_eq!((calls[1].iterations, calls[1].restart_sol), (1000, false));
}

#[test]
fn empty_remesh_output_stops_before_next_stage() {
    let case = CaseDir::new(MACH_COLD).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Empty);

    let err = run_adaptation(&loaded, &solver, &remesher).unwrap_err();
    assert!(matches!(adaptation_error(&err), Some(AdaptError::Remesh(_))));
    assert!(format!("{err:#}").contains("ite0: remeshing failed"));
    assert_eq!(
        case.entries("adap").expect("adap"),
        ["history_adap.csv", "ini"]
    );
    assert!(!case.path().join("mesh_adapted.su2").exists());
}

#[test]
fn remesher_failure_is_reported_as_remesh_error() {
    let case = CaseDir::new(MACH_COLD).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Fail);

    let err = run_adaptation(&loaded, &solver, &remesher).unwrap_err();
    assert!(matches!(adaptation_error(&err), Some(AdaptError::Remesh(_))));
    assert!(!case.path().join("adap/ite0").exists());
}

#[test]
fn missing_restart_after_success_is_solver_failure() {
    let case = CaseDir::new(MACH_COLD).expect("case");
    let loaded = case.load().expect("config");
    // Call 0 is the bootstrap solve, call 1 the first stage solve.
    let solver = ScriptedSolver::new("cd").without_restart_at(1);
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let err = run_adaptation(&loaded, &solver, &remesher).unwrap_err();
    match adaptation_error(&err) {
        Some(AdaptError::SolverFailure(message)) => assert!(message.contains("flo.csv")),
        other => panic!("expected solver failure, got {other:?}"),
    }
    assert!(format!("{err:#}").contains("ite0: resolving failed"));

    // The stage log was flushed and closed despite the failure.
    let log = fs::read_to_string(case.path().join("adap/ite0/log.out")).expect("log");
    assert!(log.contains("DIRECT solver, 1000 iterations"));
}

#[test]
fn failing_bootstrap_solve_is_solver_failure() {
    let case = CaseDir::new(MACH_COLD).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd").failing_at(0);
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let err = run_adaptation(&loaded, &solver, &remesher).unwrap_err();
    assert!(matches!(
        adaptation_error(&err),
        Some(AdaptError::SolverFailure(_))
    ));
    assert!(remesher.requests().is_empty());
}

#[test]
fn config_errors_leave_previous_run_untouched() {
    let case = CaseDir::new(
        r#"
[case]
mesh_filename = "mesh.su2"

[adaptation]
complexity = [1000.0, 2000.0]
sub_iterations = [1]
"#,
    )
    .expect("case");
    fs::create_dir_all(case.path().join("adap/ite3")).expect("previous run");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let err = run_adaptation(&loaded, &solver, &remesher).unwrap_err();
    match adaptation_error(&err) {
        Some(AdaptError::Config(message)) => {
            assert!(message.contains("adaptation.sensor"));
            assert!(message.contains("case.restart_sol"));
            assert!(message.contains("case.mesh_out_filename"));
        }
        other => panic!("expected config error, got {other:?}"),
    }
    assert!(case.path().join("adap/ite3").is_dir());
    assert!(solver.calls().is_empty());
}

#[test]
fn missing_initial_mesh_is_missing_artifact() {
    let case = CaseDir::new(&MACH_COLD.replace("mesh.su2", "absent.su2")).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let err = run_adaptation(&loaded, &solver, &remesher).unwrap_err();
    match adaptation_error(&err) {
        Some(AdaptError::MissingArtifact(files)) => assert!(files[0].ends_with("absent.su2")),
        other => panic!("expected missing artifact, got {other:?}"),
    }
}

#[test]
fn rerun_starts_from_a_fresh_root() {
    let case = CaseDir::new(MACH_COLD).expect("case");
    fs::create_dir_all(case.path().join("adap/ite7")).expect("stale stage");
    fs::write(case.path().join("adap/ite7/log.out"), "stale").expect("stale log");
    let loaded = case.load().expect("config");

    for _ in 0..2 {
        let solver = ScriptedSolver::new("cd");
        let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);
        run_adaptation(&loaded, &solver, &remesher).expect("adaptation");
        assert_eq!(
            case.entries("adap").expect("adap"),
            ["history_adap.csv", "ini", "ite0", "ite1"]
        );
        let history = fs::read_to_string(case.path().join("adap/history_adap.csv"))
            .expect("history");
        assert_eq!(history.lines().count(), 4);
    }
}

#[test]
fn tecplot_history_and_zero_sub_iterations() {
    let config = MACH_COLD
        .replace("sub_iterations = [2]", "sub_iterations = [0]")
        .replace("restart_sol = false", "restart_sol = false\ntabular_format = \"TECPLOT\"");
    let case = CaseDir::new(&config).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd").with_format(TabularFormat::Tecplot);
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let outcome = run_adaptation(&loaded, &solver, &remesher).expect("adaptation");
    assert_eq!(outcome.stages, 0);
    assert!(outcome.final_stage.ends_with("adap/ini"));
    assert!(outcome.history.ends_with("history_adap.dat"));
    assert!(remesher.requests().is_empty());

    // The linked initial mesh is promoted as a real file.
    let promoted = case.path().join("mesh_adapted.su2");
    assert!(!promoted.is_symlink());
    assert_eq!(
        fs::read_to_string(&promoted).expect("promoted"),
        fs::read_to_string(case.path().join("mesh.su2")).expect("input mesh")
    );
}

#[test]
fn stage_round_trip_preserves_metadata_in_both_formats() {
    let case = CaseDir::new(MACH_COLD).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);
    run_adaptation(&loaded, &solver, &remesher).expect("adaptation");

    let stage = case.path().join("adap/ite0");
    let native = su2::read_bundle(&stage.join("adap.su2"), &stage.join("flo_ini.csv"))
        .expect("native");
    let itp = interchange::read_bundle(&stage.join("flo_itp.json")).expect("interchange");
    assert_eq!(native.metadata(), itp.metadata());
    assert_boundary_of_unit_square(&native);
    assert_eq!(itp.solution_tag(), FLOW_COLUMNS);
}

/// Cold start in goal mode: the bootstrap adjoint computes the metric for the
/// first scheduled size and its suffixed restart becomes the current adjoint.
#[test]
fn cold_goal_bootstrap_uses_first_complexity() {
    let case = CaseDir::new(GOAL_COLD_TWO_LEVELS).expect("case");
    let loaded = case.load().expect("config");
    let schedule = plan_schedule(&loaded.config).expect("schedule");
    let suffix = preflight(&loaded.config, schedule.sensor).expect("preflight");
    assert_eq!(suffix, "cd");

    let dirs = StageDirs::enter_fresh_root(&loaded.adap_root(), Duration::ZERO).expect("root");
    let mut history = HistoryTable::new(dirs.root(), loaded.config.case.tabular_format);
    let solver = ScriptedSolver::new(&suffix);
    let boot = bootstrap(&loaded, &schedule, &suffix, &dirs, &solver, &mut history)
        .expect("bootstrap");

    assert_eq!(boot.branch, BootstrapBranch::ColdStart);
    let ini = dirs.stage_path("ini");
    assert_eq!(boot.state.flow, ini.join("restart_flow.csv"));
    assert_eq!(boot.state.adjoint, Some(ini.join("restart_adj_cd.csv")));
    assert!(ini.join("restart_adj_cd.csv").is_file());

    let calls = solver.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].mode, SolverMode::Direct);
    assert_eq!((calls[0].iterations, calls[0].cfl), (300, Some(2.0)));
    assert_eq!(calls[0].metric, None);
    assert_eq!(calls[1].mode, SolverMode::DiscreteAdjoint);
    assert_eq!((calls[1].iterations, calls[1].restart_sol), (300, false));
    let metric = calls[1].metric.expect("adjoint computes the metric");
    assert_eq!(metric.complexity, 800);
}

/// Each size level hands its own complexity, iteration counts and CFL to the
/// remesher and the solver.
#[test]
fn two_level_schedule_applies_level_settings() {
    let case = CaseDir::new(GOAL_COLD_TWO_LEVELS).expect("case");
    let loaded = case.load().expect("config");
    let solver = ScriptedSolver::new("cd");
    let remesher = ScriptedRemesher::new(RemeshBehavior::Refine);

    let outcome = run_adaptation(&loaded, &solver, &remesher).expect("adaptation");
    assert_eq!(outcome.stages, 3);
    assert_eq!(
        case.entries("adap").expect("adap"),
        ["history_adap.csv", "ini", "ite0", "ite1", "ite2"]
    );

    let complexities: Vec<u64> = remesher
        .requests()
        .iter()
        .map(|request| request.complexity)
        .collect();
    assert_eq!(complexities, [800, 3200, 3200]);

    // Two bootstrap solves, then a direct and an adjoint solve per stage.
    let calls = solver.calls();
    assert_eq!(calls.len(), 8);
    let expected = [
        ("ite0", 100, 50, 5.0, 800),
        ("ite1", 200, 60, 10.0, 3200),
        ("ite2", 200, 60, 10.0, 3200),
    ];
    for (pair, (stage, flow_iter, adj_iter, cfl, complexity)) in
        calls[2..].chunks(2).zip(expected)
    {
        let (direct, adjoint) = (&pair[0], &pair[1]);
        assert!(direct.workdir.ends_with(format!("adap/{stage}")));
        assert_eq!(direct.mode, SolverMode::Direct);
        assert_eq!((direct.iterations, direct.cfl), (flow_iter, Some(cfl)));
        assert!(direct.restart_sol);

        assert!(adjoint.workdir.ends_with(format!("adap/{stage}")));
        assert_eq!(adjoint.mode, SolverMode::DiscreteAdjoint);
        assert_eq!((adjoint.iterations, adjoint.cfl), (adj_iter, Some(cfl)));
        assert_eq!(adjoint.metric.map(|m| m.complexity), Some(complexity));
    }

    let history = fs::read_to_string(&outcome.history).expect("history");
    let prefixes: Vec<String> = history
        .lines()
        .skip(1)
        .map(|line| line.splitn(3, ',').take(2).collect::<Vec<_>>().join(","))
        .collect();
    assert_eq!(prefixes, ["0,800", "1,800", "2,3200", "3,3200"]);
}
