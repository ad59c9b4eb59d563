//! BDD tag enrichment through the test lifecycle

use allure_bridge_common::{Link, ReporterConfig, RunResults};
use allure_bridge_reporter::{
    Examples, ExampleRow, Reporter, ReportingInterface, Scenario, ScenarioSnapshot, SuiteInfo,
    TagScope, TestInfo,
};

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|t| t.to_string()).collect()
}

fn test_info(id: &str, title: &str) -> TestInfo {
    TestInfo {
        id: id.to_string(),
        title: title.to_string(),
        title_path: vec!["Accounts".to_string()],
        file: Some("cypress/e2e/accounts.feature".to_string()),
        ..Default::default()
    }
}

fn reporter(config: ReporterConfig) -> Reporter {
    let mut reporter = Reporter::new(config);
    reporter.start_suite(&SuiteInfo {
        title: "Accounts".to_string(),
        ..Default::default()
    });
    reporter
}

fn outline_row(name: &str, row_id: Option<&str>) -> ScenarioSnapshot {
    ScenarioSnapshot {
        feature: TagScope {
            name: "Accounts".to_string(),
            tags: tags(&["@smoke"]),
        },
        rule: None,
        scenario: Scenario {
            name: name.to_string(),
            keyword: "Scenario Outline".to_string(),
            tags: tags(&["@severity(\"critical\")"]),
            examples: vec![Examples {
                tags: vec![],
                header: tags(&["user", "tms"]),
                rows: vec![
                    ExampleRow {
                        id: Some("row-1".to_string()),
                        cells: tags(&["alice", "T-1"]),
                    },
                    ExampleRow {
                        id: Some("row-2".to_string()),
                        cells: tags(&["bob", "T-2"]),
                    },
                ],
            }],
            row_id: row_id.map(str::to_string),
        },
    }
}

fn run_scenario(reporter: &mut Reporter, id: &str, snapshot: ScenarioSnapshot) {
    let test = test_info(id, &snapshot.scenario.name);
    reporter.set_scenario(Some(snapshot));
    reporter.start_case(&test).expect("start test");
    reporter.pass_test_case(&test).expect("pass test");
    reporter.set_scenario(None);
}

fn tms_links<'a>(results: &'a RunResults, name: &str) -> Vec<&'a Link> {
    results
        .test(name)
        .expect("test result")
        .links
        .iter()
        .filter(|l| l.link_type.as_deref() == Some("tms"))
        .collect()
}

/// Each outline row gets only its own row's link
#[test]
fn outline_rows_get_their_own_links() {
    let mut reporter = reporter(ReporterConfig {
        tms_prefix: Some("https://tms.example.com/case/".to_string()),
        ..Default::default()
    });
    run_scenario(&mut reporter, "t1", outline_row("Sign in (example #1)", None));
    run_scenario(&mut reporter, "t2", outline_row("Sign in (example #2)", None));
    run_scenario(&mut reporter, "t3", outline_row("Sign in as bob", Some("row-2")));
    reporter.end_run();
    let results = reporter.results();

    for (name, expected) in [
        ("Sign in (example #1)", "https://tms.example.com/case/T-1"),
        ("Sign in (example #2)", "https://tms.example.com/case/T-2"),
        ("Sign in as bob", "https://tms.example.com/case/T-2"),
    ] {
        let links = tms_links(&results, name);
        assert_eq!(links.len(), 1, "links of '{}'", name);
        assert_eq!(links[0].url, expected);
    }
    let first = results.test("Sign in (example #1)").expect("first row");
    assert_eq!(first.labels_named("severity").collect::<Vec<_>>(), vec!["critical"]);
    assert_eq!(first.labels_named("tag").collect::<Vec<_>>(), vec!["smoke"]);
}

/// `feature` and `suite` hold one value; the narrowest scope wins
#[test]
fn feature_and_suite_labels_stay_single() {
    let mut reporter = reporter(ReporterConfig::default());
    let snapshot = ScenarioSnapshot {
        feature: TagScope {
            name: "Accounts".to_string(),
            tags: tags(&["@feature(\"Billing\")", "@suite(\"Outer\")"]),
        },
        rule: Some(TagScope {
            name: "Invoices".to_string(),
            tags: tags(&["@feature(\"Invoices\")", "@owner(\"finance\")"]),
        }),
        scenario: Scenario {
            name: "Pay an invoice".to_string(),
            keyword: "Scenario".to_string(),
            tags: tags(&["@suite(\"Payments\")"]),
            ..Default::default()
        },
    };
    let test = test_info("t1", "Pay an invoice");
    reporter.set_scenario(Some(snapshot));
    reporter.start_case(&test).expect("start test");
    reporter.feature("Declared in code");
    reporter.pass_test_case(&test).expect("pass test");
    reporter.end_run();

    let results = reporter.results();
    let test = results.test("Pay an invoice").expect("test result");
    assert_eq!(test.labels_named("feature").collect::<Vec<_>>(), vec!["Invoices"]);
    assert_eq!(test.labels_named("suite").collect::<Vec<_>>(), vec!["Payments"]);
    assert_eq!(test.labels_named("owner").collect::<Vec<_>>(), vec!["finance"]);
}

/// Tag links and interface links expand issue and tms ids the same way
#[test]
fn link_prefixes_apply_to_tags_and_calls() {
    let mut reporter = reporter(ReporterConfig {
        issue_prefix: Some("https://jira.example.com/browse/".to_string()),
        tms_prefix: Some("https://tms.example.com/*/view".to_string()),
        ..Default::default()
    });
    let snapshot = ScenarioSnapshot {
        feature: TagScope {
            name: "Accounts".to_string(),
            tags: vec![],
        },
        rule: None,
        scenario: Scenario {
            name: "Close an account".to_string(),
            tags: tags(&[
                "@issue(\"BUG-7\")",
                "@link(\"docs\",\"https://docs.example.com/close\")",
            ]),
            ..Default::default()
        },
    };
    let test = test_info("t1", "Close an account");
    reporter.set_scenario(Some(snapshot));
    reporter.start_case(&test).expect("start test");
    reporter.tms("C-12", "C-12");
    reporter.pass_test_case(&test).expect("pass test");
    reporter.end_run();

    let results = reporter.results();
    let links: Vec<(Option<&str>, &str)> = results.tests[0]
        .links
        .iter()
        .map(|l| (l.link_type.as_deref(), l.url.as_str()))
        .collect();
    assert_eq!(
        links,
        vec![
            (Some("tms"), "https://tms.example.com/C-12/view"),
            (Some("issue"), "https://jira.example.com/browse/BUG-7"),
            (Some("link"), "https://docs.example.com/close"),
        ]
    );
}
