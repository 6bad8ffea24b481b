use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use super::check::{
    PairOutcome, ResolutionProblem, VerificationError, VerificationReport, verify_lineages,
};
use super::lineage::{
    CodePattern, LineageAssertion, LineageElement, builtin_lineages, find_contradictions,
    load_lineages,
};
use super::report::write_report;
use super::store::LineageStore;
use super::run;
use super::structural_invariants::collect_structural_invariants;
use crate::cli::{ClosureArgs, MergeArgs, VerifyArgs};
use crate::commands::{closure, merge};
use crate::model::{
    AncestorEdge, CLOSURE_FILE_NAME, MERGED_FILE_NAME, NodeId, REFERENCE_FILE_NAME,
    SCRAPED_FILE_NAME, normalize_node_id,
};
use crate::table::{Table, read_records, write_records};

/// (node id, parent id, combined code, short name)
type FixtureNode = (&'static str, &'static str, &'static str, &'static str);

const FIXTURE_NODES: [FixtureNode; 16] = [
    ("1", "", "", "Non-individual"),
    ("2", "", "", "Individual or Groups (of Individuals)"),
    ("14", "1", "", "Ambulatory Health Care Facilities"),
    ("2496", "14", "261Q00000X", "Clinic/Center"),
    ("2501", "2496", "261QA1903X", "Ambulatory Surgical"),
    ("2587", "1", "", "Hospital Units"),
    ("2588", "2587", "273100000X", "Epilepsy Unit"),
    ("2476", "1", "", "Hospitals"),
    ("2477", "2476", "281P00000X", "Chronic Disease Hospital"),
    ("2478", "2477", "281PC2000X", "Children"),
    ("1962", "2", "", "Allopathic & Osteopathic Physicians"),
    ("1974", "1962", "207N00000X", "Dermatology"),
    ("1975", "1974", "207NP0225X", "Pediatric Dermatology"),
    ("2293", "2", "", "Behavioral Health & Social Service Providers"),
    ("2299", "2293", "101Y00000X", "Counselor"),
    ("2300", "2299", "101YM0800X", "Mental Health"),
];

fn edge(ancestor: &str, descendant: &str) -> AncestorEdge {
    AncestorEdge::new(NodeId::new(ancestor), NodeId::new(descendant))
}

fn fixture_edges() -> Vec<AncestorEdge> {
    let parents = FIXTURE_NODES
        .iter()
        .map(|(id, parent, _, _)| (*id, *parent))
        .collect::<BTreeMap<&str, &str>>();

    let mut edges = Vec::new();
    for (id, _, _, _) in FIXTURE_NODES {
        edges.push(edge(id, id));
        let mut current = parents[id];
        while !current.is_empty() {
            edges.push(edge(current, id));
            current = parents[current];
        }
    }
    edges
}

fn fixture_table(nodes: &[FixtureNode]) -> Table {
    let mut table = Table::new(
        [
            "combined_code",
            "merge_status",
            "scraped_code_id",
            "scraped_code_short_name",
            "scraped_immediate_parent_code_id",
        ]
        .iter()
        .map(|header| header.to_string())
        .collect(),
    );
    for (id, parent, code, name) in nodes {
        let status = if code.is_empty() { "scraped_only" } else { "matched" };
        table
            .push_row(vec![
                code.to_string(),
                status.to_string(),
                id.to_string(),
                name.to_string(),
                parent.to_string(),
            ])
            .expect("fixture row width");
    }
    table
}

fn verify_builtin(edges: &[AncestorEdge], nodes: &Table) -> VerificationReport {
    let pattern = CodePattern::new().expect("pattern");
    let lineages = builtin_lineages(&pattern).expect("builtin lineages");
    let store = LineageStore::load(edges, nodes).expect("store should load");
    verify_lineages(&store, &lineages).expect("verification should run")
}

fn lineage(raw: &[&str]) -> LineageAssertion {
    let pattern = CodePattern::new().expect("pattern");
    LineageAssertion::parse(raw, &pattern).expect("lineage should parse")
}

#[test]
fn builtin_lineages_pass_on_consistent_data() {
    let report = verify_builtin(&fixture_edges(), &fixture_table(&FIXTURE_NODES));

    assert_eq!(report.lineages.len(), 5);
    assert_eq!(report.passed_count(), 5);
    assert!(report.all_passed());
    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
}

#[test]
fn closure_and_parent_pointer_methods_agree_on_every_pair() {
    let report = verify_builtin(&fixture_edges(), &fixture_table(&FIXTURE_NODES));

    let checks = report
        .lineages
        .iter()
        .flat_map(|lineage| lineage.pairs.iter())
        .collect::<Vec<&PairOutcome>>();
    assert_eq!(checks.len(), 3 + 2 + 3 + 3 + 3);
    for pair in checks {
        let PairOutcome::Checked(check) = pair else {
            panic!("every fixture element should resolve");
        };
        assert!(check.methods_agree());
        assert!(check.closure);
    }
}

#[test]
fn labels_resolve_through_short_names() {
    let report = verify_builtin(&fixture_edges(), &fixture_table(&FIXTURE_NODES));
    let first = &report.lineages[0];

    let resolved_ids = first
        .resolved
        .iter()
        .map(|resolution| resolution.as_ref().expect("resolved").node_id.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(resolved_ids, vec!["2501", "2496", "14", "1"]);
}

#[test]
fn missing_closure_edge_fails_only_the_affected_lineage() {
    let edges = fixture_edges()
        .into_iter()
        .filter(|candidate| *candidate != edge("2496", "2501"))
        .collect::<Vec<AncestorEdge>>();

    let report = verify_builtin(&edges, &fixture_table(&FIXTURE_NODES));

    assert_eq!(report.passed_count(), 4);
    assert!(!report.lineages[0].passed());
    assert!(report.lineages[1..].iter().all(|lineage| lineage.passed()));

    let PairOutcome::Checked(check) = &report.lineages[0].pairs[0] else {
        panic!("pair should be checked");
    };
    assert!(!check.closure);
    assert!(check.parent_pointer);

    assert_eq!(
        report.errors,
        vec![VerificationError::Disagreement {
            lineage: 1,
            child: LineageElement::Code("261QA1903X".to_string()),
            parent: LineageElement::Code("261Q00000X".to_string()),
            closure: false,
            parent_pointer: true,
        }]
    );
}

#[test]
fn blank_parent_pointer_is_reported_as_disagreement() {
    let mut nodes = FIXTURE_NODES;
    nodes[6] = ("2588", "", "273100000X", "Epilepsy Unit");

    let report = verify_builtin(&fixture_edges(), &fixture_table(&nodes));

    assert!(!report.lineages[1].passed());
    assert_eq!(report.passed_count(), 4);
    assert!(report.errors.iter().any(|error| matches!(
        error,
        VerificationError::Disagreement {
            lineage: 2,
            closure: true,
            parent_pointer: false,
            ..
        }
    )));
}

#[test]
fn duplicate_short_name_is_a_resolution_error() {
    let mut nodes = FIXTURE_NODES.to_vec();
    nodes.push(("9001", "2", "", "Hospitals"));
    let mut edges = fixture_edges();
    edges.push(edge("9001", "9001"));
    edges.push(edge("2", "9001"));

    let report = verify_builtin(&edges, &fixture_table(&nodes));

    assert_eq!(report.passed_count(), 4);
    let third = &report.lineages[2];
    assert!(!third.passed());
    assert!(matches!(
        third.resolved[2],
        Err(ResolutionProblem::MultipleMatches(ref matches)) if matches.len() == 2
    ));
    assert!(matches!(third.pairs[0], PairOutcome::Checked(_)));
    assert!(matches!(third.pairs[1], PairOutcome::Unresolved { .. }));
    assert!(matches!(third.pairs[2], PairOutcome::Unresolved { .. }));
}

#[test]
fn reference_only_row_cannot_stand_in_for_a_tree_node() {
    let mut nodes = FIXTURE_NODES.to_vec();
    nodes.retain(|(id, _, _, _)| *id != "2478");
    nodes.push(("", "", "281PC2000X", ""));

    let report = verify_builtin(&fixture_edges(), &fixture_table(&nodes));

    assert!(matches!(
        report.lineages[2].resolved[0],
        Err(ResolutionProblem::NotInTree(_))
    ));
    assert!(
        report.errors[0]
            .to_string()
            .contains("has no scraped node id")
    );
}

#[test]
fn unknown_code_reports_no_match_and_other_lineages_still_run() {
    let mut nodes = FIXTURE_NODES.to_vec();
    nodes.retain(|(id, _, _, _)| *id != "2300");

    let report = verify_builtin(&fixture_edges(), &fixture_table(&nodes));

    assert_eq!(report.lineages.len(), 5);
    assert_eq!(report.passed_count(), 4);
    assert_eq!(
        report.errors,
        vec![VerificationError::Resolution {
            lineage: 5,
            element: LineageElement::Code("101YM0800X".to_string()),
            problem: ResolutionProblem::NoMatch,
        }]
    );
}

#[test]
fn parent_pointer_walk_is_bounded_by_remaining_chain_length() {
    let store = LineageStore::load(&fixture_edges(), &fixture_table(&FIXTURE_NODES))
        .expect("store should load");
    let assertion = lineage(&["261QA1903X", "Non-individual"]);

    let report = verify_lineages(&store, &[assertion]).expect("verification should run");
    let PairOutcome::Checked(check) = &report.lineages[0].pairs[0] else {
        panic!("pair should be checked");
    };
    assert_eq!(check.max_hops, 1);
    assert!(check.closure);
    assert!(!check.parent_pointer);
    assert!(!report.all_passed());
}

#[test]
fn parent_pointer_cycle_terminates() {
    let mut nodes = FIXTURE_NODES;
    nodes[2] = ("14", "2501", "", "Ambulatory Health Care Facilities");
    let store =
        LineageStore::load(&fixture_edges(), &fixture_table(&nodes)).expect("store should load");

    let reached = store
        .parent_chain_reaches(&NodeId::new("2501"), &NodeId::new("1"), 50)
        .expect("query should run");
    assert!(!reached);
}

#[test]
fn structural_invariants_are_clean_for_consistent_data() {
    let store = LineageStore::load(&fixture_edges(), &fixture_table(&FIXTURE_NODES))
        .expect("store should load");
    let summary = collect_structural_invariants(store.connection()).expect("invariants");
    assert!(summary.is_clean(), "unexpected violations: {summary:?}");
}

#[test]
fn structural_invariants_count_violations() {
    let edges = fixture_edges()
        .into_iter()
        .filter(|candidate| *candidate != edge("14", "14"))
        .collect::<Vec<AncestorEdge>>();
    let mut nodes = FIXTURE_NODES;
    nodes[4] = ("2501", "7777", "261QA1903X", "Ambulatory Surgical");
    nodes[9] = ("2478", "", "281PC2000X", "Children");

    let store = LineageStore::load(&edges, &fixture_table(&nodes)).expect("store should load");
    let summary = collect_structural_invariants(store.connection()).expect("invariants");

    assert_eq!(summary.reflexive_edge_missing_count, 1);
    assert_eq!(summary.dangling_parent_pointer_count, 1);
    assert_eq!(summary.parent_outside_closure_count, 1);
    assert_eq!(summary.parent_required_missing_count, 1);
    assert_eq!(summary.duplicate_node_id_count, 0);
}

#[test]
fn float_formatted_ids_are_normalized() {
    assert_eq!(normalize_node_id("2496.0"), "2496");
    assert_eq!(normalize_node_id(" 14 "), "14");
    assert_eq!(normalize_node_id("12.0a"), "12.0a");
    assert_eq!(normalize_node_id(".0"), ".0");
}

#[test]
fn elements_are_classified_by_code_format() {
    let assertion = lineage(&["261QA1903X", "261Q00000X", "Hospital Units"]);
    assert_eq!(
        assertion.elements,
        vec![
            LineageElement::Code("261QA1903X".to_string()),
            LineageElement::Code("261Q00000X".to_string()),
            LineageElement::Label("Hospital Units".to_string()),
        ]
    );
    assert_eq!(assertion.remaining_hops(0), 2);
    assert_eq!(assertion.remaining_hops(1), 1);
    assert_eq!(
        assertion.to_string(),
        "261QA1903X -> 261Q00000X -> \"Hospital Units\""
    );

    let pattern = CodePattern::new().expect("pattern");
    assert!(!pattern.is_code("261qa1903x"));
    assert!(!pattern.is_code("Non-individual"));
}

#[test]
fn lineage_parse_rejects_single_and_blank_elements() {
    let pattern = CodePattern::new().expect("pattern");
    assert!(LineageAssertion::parse(&["261QA1903X"], &pattern).is_err());
    assert!(LineageAssertion::parse(&["261QA1903X", "  "], &pattern).is_err());
}

#[test]
fn builtin_lineages_do_not_contradict_each_other() {
    let pattern = CodePattern::new().expect("pattern");
    let lineages = builtin_lineages(&pattern).expect("builtin lineages");
    assert!(find_contradictions(&lineages).is_empty());
}

#[test]
fn reversed_ancestry_is_detected_as_contradiction() {
    let lineages = vec![
        lineage(&["261Q00000X", "Hospitals"]),
        lineage(&["Hospitals", "Non-individual", "261Q00000X"]),
    ];
    let contradictions = find_contradictions(&lineages);
    assert_eq!(contradictions.len(), 1);
}

#[test]
fn load_lineages_reads_json_chains() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("lineages.json");
    std::fs::write(&path, r#"[["273100000X", "Hospital Units", "Non-individual"]]"#)
        .expect("write lineages");

    let pattern = CodePattern::new().expect("pattern");
    let lineages = load_lineages(&path, &pattern).expect("lineages should load");
    assert_eq!(lineages.len(), 1);
    assert_eq!(lineages[0].elements.len(), 3);

    std::fs::write(&path, "[]").expect("write empty");
    assert!(load_lineages(&path, &pattern).is_err());
}

#[test]
fn report_lists_chain_results_and_summary() {
    let edges = fixture_edges()
        .into_iter()
        .filter(|candidate| *candidate != edge("2496", "2501"))
        .collect::<Vec<AncestorEdge>>();
    let nodes = fixture_table(&FIXTURE_NODES);
    let report = verify_builtin(&edges, &nodes);
    let store = LineageStore::load(&edges, &nodes).expect("store should load");
    let invariants = collect_structural_invariants(store.connection()).expect("invariants");

    let mut output = Vec::new();
    write_report(&mut output, &report, &invariants).expect("report should render");
    let text = String::from_utf8(output).expect("report is utf-8");
    assert!(text.contains(
        "Lineage 1: 261QA1903X -> 261Q00000X -> \"Ambulatory Health Care Facilities\" -> \"Non-individual\""
    ));
    assert!(text.contains("261QA1903X -> 261Q00000X: closure=fail parent_pointer=pass (max 3 hops) DISAGREE"));
    assert!(text.contains("parent_outside_closure: 1"));
    assert!(text.contains("Summary: 4 passed, 1 failed"));
}

fn saved_tree_page() -> String {
    let nodes = FIXTURE_NODES
        .iter()
        .map(|(id, parent, _, name)| {
            let parent = if parent.is_empty() { "0" } else { *parent };
            serde_json::json!({ "id": id, "pId": parent, "name": name })
        })
        .collect::<Vec<serde_json::Value>>();
    format!(
        "<html><head><script>\nvar treenodes = {};\n</script></head></html>\n",
        serde_json::to_string(&nodes).expect("treenodes json")
    )
}

fn string_row(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Runs `closure` and `merge` over the fixture tree, leaving every pipeline
/// file under the returned data directory.
fn build_pipeline(root: &Path) -> PathBuf {
    let data_dir = root.join("data");
    let tree_path = root.join("taxonomy.html");
    fs::write(&tree_path, saved_tree_page()).expect("write saved page");

    let mut scraped = Table::new(string_row(&["code_id", "code_text", "code_short_name"]));
    let mut reference = Table::new(string_row(&["Code", "Grouping"]));
    for (id, _, code, name) in FIXTURE_NODES {
        scraped.push_row(string_row(&[id, code, name])).expect("scraped row");
        if !code.is_empty() {
            reference.push_row(string_row(&[code, "fixture"])).expect("reference row");
        }
    }
    scraped.write_csv(&data_dir.join(SCRAPED_FILE_NAME)).expect("write scraped");
    reference.write_csv(&data_dir.join(REFERENCE_FILE_NAME)).expect("write reference");

    closure::run(ClosureArgs {
        data_dir: data_dir.clone(),
        tree_path,
        output_path: None,
    })
    .expect("closure should build");
    merge::run(MergeArgs {
        data_dir: data_dir.clone(),
        scraped_path: None,
        reference_path: None,
        closure_path: None,
        output_path: None,
        manifest_path: None,
        subsets_dir: None,
    })
    .expect("merge should succeed");

    data_dir
}

fn verify_args(data_dir: &Path) -> VerifyArgs {
    VerifyArgs {
        data_dir: data_dir.to_path_buf(),
        ..VerifyArgs::default()
    }
}

#[test]
fn run_succeeds_on_freshly_built_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = build_pipeline(dir.path());

    let code = run(verify_args(&data_dir)).expect("verify should run");
    assert_eq!(code, ExitCode::SUCCESS);
}

#[test]
fn run_fails_after_closure_edge_is_dropped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = build_pipeline(dir.path());

    let closure_path = data_dir.join(CLOSURE_FILE_NAME);
    let edges: Vec<AncestorEdge> = read_records(&closure_path).expect("closure table");
    assert!(edges.contains(&edge("2496", "2501")));
    let trimmed = edges
        .into_iter()
        .filter(|candidate| *candidate != edge("2496", "2501"))
        .collect::<Vec<AncestorEdge>>();
    write_records(&closure_path, &trimmed).expect("rewrite closure");

    let code = run(verify_args(&data_dir)).expect("verify should run");
    assert_eq!(code, ExitCode::FAILURE);
}

#[test]
fn run_aborts_when_merged_table_is_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = build_pipeline(dir.path());
    fs::remove_file(data_dir.join(MERGED_FILE_NAME)).expect("remove merged table");

    let error = run(verify_args(&data_dir)).expect_err("missing merged table should fail");
    assert!(
        format!("{error:#}").contains(MERGED_FILE_NAME),
        "unexpected error: {error:#}"
    );
}

#[test]
fn run_aborts_on_malformed_closure_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = build_pipeline(dir.path());
    fs::write(data_dir.join(CLOSURE_FILE_NAME), "parent,child,depth\n1,2,x\n")
        .expect("overwrite closure");

    assert!(run(verify_args(&data_dir)).is_err());
}

#[test]
fn run_aborts_on_contradictory_lineage_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = build_pipeline(dir.path());
    let lineages_path = dir.path().join("lineages.json");
    fs::write(
        &lineages_path,
        r#"[["261Q00000X", "Hospitals"], ["Hospitals", "261Q00000X"]]"#,
    )
    .expect("write lineages");

    let error = run(VerifyArgs {
        lineages_path: Some(lineages_path),
        ..verify_args(&data_dir)
    })
    .expect_err("contradictory lineages should fail");
    assert!(error.to_string().contains("contradict"), "unexpected error: {error}");
}
