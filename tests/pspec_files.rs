//! End-to-end runs: write `.pspec` trees to a temp directory, drive the
//! harness, and assert on the recorded sub-test outcomes.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use pspec::lang::functions::{req, FunctionBuilder, FunctionRegistry, TypeSpec};
use pspec::lang::issue::{Reported, EVAL_FAILURE};
use pspec::lang::value::Value;
use pspec::runner::{run_spec_tests, RecordingReporter, Summary};

fn write_specs(dir: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

fn run_files(files: &[(&str, &str)]) -> (RecordingReporter, Summary) {
    run_files_with(files, None)
}

fn run_files_with(
    files: &[(&str, &str)],
    init: Option<&dyn Fn(&mut FunctionRegistry)>,
) -> (RecordingReporter, Summary) {
    let dir = tempfile::tempdir().unwrap();
    write_specs(dir.path(), files);
    let mut reporter = RecordingReporter::new();
    let summary = run_spec_tests(&mut reporter, dir.path(), init).unwrap();
    (reporter, summary)
}

#[test]
fn arithmetic_example_passes_under_its_group() {
    let (reporter, summary) = run_files(&[(
        "arith.pspec",
        "Examples('arith', Example('add', Given('1 + 2'), Evaluates_to(3)))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 });
    assert_eq!(reporter.passed(), vec!["arith/add"]);
}

#[test]
fn failing_evaluation_reports_the_value_diff() {
    let (reporter, summary) = run_files(&[(
        "arith.pspec",
        "Example('bad math', Given('2 + 2'), Evaluates_to(5))",
    )]);
    assert_eq!(summary.failed, 1);
    let failed = reporter.failed();
    assert_eq!(failed[0].0, "bad math");
    assert!(failed[0].1.contains("expected Integer '5', got Integer '4'"));
}

#[test]
fn each_source_fragment_runs_every_result() {
    let (reporter, _) = run_files(&[(
        "frags.pspec",
        "Example('fragments', Given(Source('1 + 2', '5')), Evaluates_to(3))",
    )]);
    // The first fragment passes; the second fails, proving both ran inside
    // the one sub-test.
    let failed = reporter.failed();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].1.contains("got Integer '5'"));
}

#[test]
fn unknown_variable_issue_is_matched_by_code() {
    let (reporter, summary) = run_files(&[(
        "vars.pspec",
        "Example('unknown var', Given('$x'), Evaluates_with(Error(EVAL_UNKNOWN_VARIABLE)))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 });
    assert_eq!(reporter.passed(), vec!["unknown var"]);
}

#[test]
fn unmatched_expectation_fails_with_the_diff() {
    let (reporter, _) = run_files(&[(
        "vars.pspec",
        "Example('quiet', Given('1'), Evaluates_with(Error(EVAL_UNKNOWN_VARIABLE)))",
    )]);
    let failed = reporter.failed();
    assert!(failed[0]
        .1
        .contains("Expected error(EVAL_UNKNOWN_VARIABLE) but it was not produced"));
}

#[test]
fn parses_to_compares_pn_forms() {
    let (reporter, summary) = run_files(&[(
        "pn.pspec",
        "Example('pn', Given('1 + 2'), Parses_to('(+ 1 2)'))\n\
         Example('pn neg', Given('-3'), Parses_to('-3'))",
    )]);
    assert_eq!(summary, Summary { passed: 2, failed: 0 });
    assert_eq!(reporter.passed(), vec!["pn", "pn neg"]);
}

#[test]
fn malformed_pn_literal_fails_with_rebased_location() {
    let (reporter, _) = run_files(&[(
        "pn.pspec",
        "Example('pn', Given('1 + 2'),\n  Parses_to('(+ 1'))",
    )]);
    let failed = reporter.failed();
    assert!(failed[0].1.contains("PN parse error"));
    // The Parses_to call sits on line 2 of the spec file.
    assert!(failed[0].1.contains("line 2"));
}

#[test]
fn validation_errors_match_regex_expectations() {
    let (reporter, summary) = run_files(&[(
        "syntax.pspec",
        "Example('regex', Given('{'), Validates_with(Error(/syntax/)))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 });
    assert_eq!(reporter.passed(), vec!["regex"]);
}

#[test]
fn validates_ok_rejects_strict_findings() {
    let (reporter, _) = run_files(&[(
        "strictness.pspec",
        "Example('idle', Given('1 notice(2)'), Validates_ok())",
    )]);
    let failed = reporter.failed();
    assert!(failed[0].1.contains("VALIDATE_IDLE_EXPRESSION"));
}

#[test]
fn notices_match_with_contain_and_exact_text() {
    let (reporter, summary) = run_files(&[(
        "logs.pspec",
        "Example('exact', Given(`notice('hello world')`), Evaluates_with(Notice('hello world')))\n\
         Example('contain', Given(`notice('hello world')`), Evaluates_with(Notice(Contain('lo wo'))))\n\
         Example('warn', Given(`warning('careful')`), Evaluates_with(Warning(/car/)))\n\
         Example('match', Given(`fail('kaboom')`), Evaluates_with(Error(Match(/kaboom/))))\n\
         Example('include', Given(`notice('a') notice('b')`), Evaluates_with(Notice(Include('a', 'b'))))",
    )]);
    assert_eq!(summary, Summary { passed: 5, failed: 0 }, "{:?}", reporter.failed());
    assert_eq!(
        reporter.passed(),
        vec!["exact", "contain", "warn", "match", "include"]
    );
}

#[test]
fn excluded_entries_fail_with_a_transparency_note() {
    let (reporter, _) = run_files(&[(
        "logs.pspec",
        "Example('excluded', Given(`notice('drop this')`), Evaluates_with(Notice(Exclude(Contain('drop')))))",
    )]);
    let failed = reporter.failed();
    assert!(failed[0].1.contains("matches exclusion 'drop'"));
}

#[test]
fn unexpected_log_entries_fail_evaluates_ok() {
    let (reporter, _) = run_files(&[(
        "logs.pspec",
        "Example('noisy', Given(`warning('oops')`), Evaluates_ok())",
    )]);
    let failed = reporter.failed();
    assert!(failed[0].1.contains("Unexpected warning('oops')"));
}

#[test]
fn let_bindings_resolve_through_scope_and_shadow_inward() {
    let (reporter, summary) = run_files(&[(
        "lets.pspec",
        "Examples('lets',\n\
           Let('x', 1),\n\
           Example('outer', Given('notice($x)'), Evaluates_with(Notice('1'))),\n\
           Example('inner', Let('x', 2), Given('notice($x)'), Evaluates_with(Notice('2'))))",
    )]);
    assert_eq!(summary, Summary { passed: 2, failed: 0 });
    assert_eq!(reporter.passed(), vec!["lets/outer", "lets/inner"]);
}

#[test]
fn format_values_resolve_through_get() {
    let (reporter, summary) = run_files(&[(
        "fmt.pspec",
        "Example('greet',\n\
           Let('greet', Format('hello %s', 'world')),\n\
           Given('notice($greet)'),\n\
           Evaluates_with(Notice('hello world')))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 });
    assert_eq!(reporter.passed(), vec!["greet"]);
}

#[test]
fn get_of_unknown_variable_fails_the_example() {
    let (reporter, _) = run_files(&[(
        "lets.pspec",
        "Example('missing', Given('1'), Evaluates_to(Get('nope')))",
    )]);
    let failed = reporter.failed();
    assert!(failed[0].1.contains("Get of unknown variable named 'nope'"));
}

#[test]
fn fixtures_exist_during_the_test_and_are_removed_after() {
    let recorded: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    fn content_error(message: String) -> Reported {
        Reported::error(
            &EVAL_FAILURE,
            vec![("message".to_string(), Value::from(message))],
            None,
        )
    }

    let tree_recorded = recorded.clone();
    let file_recorded = recorded.clone();
    let init = move |registry: &mut FunctionRegistry| {
        let recorded = tree_recorded.clone();
        FunctionBuilder::new("assert_tree")
            .dispatch(vec![req(TypeSpec::string())], move |inv| {
                let path = inv.args[0].as_str().expect("checked by dispatch");
                recorded.lock().unwrap().push(path.to_string());
                let file = Path::new(path).join("foo").join("a.txt");
                match fs::read_to_string(&file) {
                    Ok(content) if content == "hi" => Ok(Value::Undef),
                    Ok(content) => Err(content_error(format!("bad content: {}", content))),
                    Err(e) => Err(content_error(e.to_string())),
                }
            })
            .register(registry);

        let recorded = file_recorded.clone();
        FunctionBuilder::new("assert_file")
            .dispatch(vec![req(TypeSpec::string())], move |inv| {
                let path = inv.args[0].as_str().expect("checked by dispatch");
                recorded.lock().unwrap().push(path.to_string());
                match fs::read_to_string(path) {
                    Ok(content) if content == "payload" => Ok(Value::Undef),
                    Ok(content) => Err(content_error(format!("bad content: {}", content))),
                    Err(e) => Err(content_error(e.to_string())),
                }
            })
            .register(registry);
    };

    let (reporter, summary) = run_files_with(
        &[(
            "fixture.pspec",
            "Example('directory fixture',\n\
               Let('dir', Directory({foo => {'a.txt' => 'hi'}})),\n\
               Given(Scope({p => Get('dir')}), 'assert_tree($p)'),\n\
               Evaluates_ok())\n\
             Example('file fixture',\n\
               Let('f', File('payload')),\n\
               Given(Scope({p => Get('f')}), 'assert_file($p)'),\n\
               Evaluates_ok())",
        )],
        Some(&init),
    );
    assert_eq!(summary, Summary { passed: 2, failed: 0 }, "{:?}", reporter.failed());

    let paths = recorded.lock().unwrap().clone();
    assert_eq!(paths.len(), 2, "both fixture paths were recorded");
    for path in paths {
        assert!(!Path::new(&path).exists(), "fixture should be torn down");
    }
}

#[test]
fn settings_input_configures_the_engine_and_is_reset_between_examples() {
    let (reporter, summary) = run_files(&[(
        "settings.pspec",
        "Example('strict',\n\
           Given(Settings({strict_variables => true}), '\"$nope\"'),\n\
           Evaluates_with(Error(EVAL_UNKNOWN_VARIABLE)))\n\
         Example('lenient', Given('\"$nope\"'), Evaluates_ok())",
    )]);
    assert_eq!(summary, Summary { passed: 2, failed: 0 }, "{:?}", reporter.failed());
}

#[test]
fn parser_options_enable_backticks_and_tasks_per_example() {
    let (reporter, summary) = run_files(&[(
        "options.pspec",
        "Example('backtick',\n\
           Given(Parser_options({backtick_strings => true}), Source('`hi`')),\n\
           Evaluates_to('hi'))\n\
         Example('task',\n\
           Given(Parser_options({tasks => true}),\n\
                 Source('task deploy { command => \"run\" } deploy()')),\n\
           Evaluates_to({command => 'run'}))\n\
         Example('no backtick', Given(Source('`hi`')), Evaluates_with(Error(/backtick/)))",
    )]);
    assert_eq!(summary, Summary { passed: 3, failed: 0 }, "{:?}", reporter.failed());
}

#[test]
fn epp_sources_render_templates() {
    let (reporter, summary) = run_files(&[(
        "epp.pspec",
        "Example('epp', Given(Epp_source('a <%= 1 + 1 %> b')), Evaluates_to('a 2 b'))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 }, "{:?}", reporter.failed());
}

#[test]
fn unindent_cleans_nested_sources() {
    let (reporter, summary) = run_files(&[(
        "unindent.pspec",
        "Example('unindent',\n\
           Given(Unindent('\n    $x = 1\n    notice($x)')),\n\
           Evaluates_with(Notice('1')))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 }, "{:?}", reporter.failed());
}

#[test]
fn scope_input_seeds_variables() {
    let (reporter, summary) = run_files(&[(
        "scope.pspec",
        "Example('scoped', Given(Scope({who => 'spec'}), 'notice($who)'),\n\
           Evaluates_with(Notice('spec')))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 }, "{:?}", reporter.failed());
}

#[test]
fn named_sources_anchor_diagnostics_to_their_path() {
    let (reporter, _) = run_files(&[(
        "named.pspec",
        "Example('named', Given(Named_source('demo.src', 'notice(')), Evaluates_ok())",
    )]);
    let failed = reporter.failed();
    assert!(failed[0].1.contains("demo.src"));
}

#[test]
fn user_definitions_in_spec_files_are_usable_during_construction() {
    let (reporter, summary) = run_files(&[(
        "defs.pspec",
        "function snippet($n) { Example($n, Given('1 + 1'), Evaluates_to(2)) }\n\
         Examples('defs', snippet('from function'))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 }, "{:?}", reporter.failed());
    assert_eq!(reporter.passed(), vec!["defs/from function"]);
}

#[test]
fn construction_failure_fails_only_that_file() {
    let (reporter, summary) = run_files(&[
        ("a_bad.pspec", "Example(42, Evaluates_ok())"),
        ("b_good.pspec", "Example('ok', Given('1'), Evaluates_to(1))"),
    ]);
    assert_eq!(summary, Summary { passed: 1, failed: 1 });
    let failed = reporter.failed();
    assert_eq!(failed[0].0, "a_bad");
    assert!(failed[0].1.contains("parameter 0"));
    assert_eq!(reporter.passed(), vec!["ok"]);
}

#[test]
fn spec_files_run_in_sorted_order() {
    let (reporter, _) = run_files(&[
        ("b.pspec", "Example('second', Given('1'), Evaluates_to(1))"),
        ("a.pspec", "Example('first', Given('1'), Evaluates_to(1))"),
    ]);
    assert_eq!(reporter.passed(), vec!["first", "second"]);
}

#[test]
fn ancestor_inputs_run_before_the_examples_own() {
    let (reporter, summary) = run_files(&[(
        "inherit.pspec",
        "Examples('inherit',\n\
           Given(Scope({base => 'outer'})),\n\
           Example('sees parent scope', Given('notice($base)'),\n\
             Evaluates_with(Notice('outer'))))",
    )]);
    assert_eq!(summary, Summary { passed: 1, failed: 0 }, "{:?}", reporter.failed());
}
