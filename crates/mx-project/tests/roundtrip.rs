use mx_core::Superstructure;
use mx_project::*;

fn sample() -> ProjectFile {
    ProjectFile {
        version: LATEST_VERSION,
        name: "Roundtrip".to_string(),
        problem: ProblemDef {
            rich: vec![StreamDef {
                name: "R1".to_string(),
                c_in: 0.07,
                c_out: 0.0003,
                flow: 2.0,
            }],
            lean: vec![
                StreamDef {
                    name: "S1".to_string(),
                    c_in: 0.0006,
                    c_out: 0.031,
                    flow: 1.8,
                },
                StreamDef {
                    name: "S2".to_string(),
                    c_in: 0.0002,
                    c_out: 0.0035,
                    flow: 1.0,
                },
            ],
        },
        hybrid: HybridConfig {
            superstruct: Superstructure::StageWise,
            stages: Some(2),
            bin_cuts: true,
            ..HybridConfig::default()
        },
        solvers: SolverDef::default(),
    }
}

#[test]
fn roundtrip_yaml() {
    let project = sample();
    validate_project(&project).unwrap();

    let path = std::env::temp_dir().join("mx_project_roundtrip.yaml");
    save_yaml(&path, &project).unwrap();
    let loaded = load_yaml(&path).unwrap();

    assert_eq!(project, loaded);
}

#[test]
fn roundtrip_json() {
    let project = sample();
    let path = std::env::temp_dir().join("mx_project_roundtrip.json");
    save_json(&path, &project).unwrap();
    let loaded = load(&path).unwrap();

    assert_eq!(project, loaded);
}

#[test]
fn save_refuses_invalid_project() {
    let mut project = sample();
    project.hybrid.cor_filter_size = 2.0;
    let path = std::env::temp_dir().join("mx_project_invalid.yaml");

    let err = save_yaml(&path, &project).unwrap_err();
    assert!(matches!(err, ProjectError::Validation(ConfigurationError::InvalidValue { .. })));
}

#[test]
fn duplicate_stream_names_are_rejected() {
    let mut project = sample();
    project.problem.lean[1].name = "R1".to_string();
    let err = validate_project(&project).unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicateId { .. }));
}

#[test]
fn inverted_stream_is_a_problem_error() {
    let mut project = sample();
    project.problem.rich[0].c_out = 0.5;
    let err = validate_project(&project).unwrap_err();
    assert!(matches!(err, ConfigurationError::Problem(_)));
}

#[test]
fn unknown_extension_is_rejected() {
    let err = load(std::path::Path::new("project.toml")).unwrap_err();
    assert!(matches!(err, ProjectError::UnknownFormat { .. }));
}
