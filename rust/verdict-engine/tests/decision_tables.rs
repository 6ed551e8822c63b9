//! Hit-policy semantics, driven through the engine with small XML models.

use serde_json::json;
use verdict_engine::{Engine, EvalOptions, HitPolicy, Severity};

fn table_xml(hit_policy: &str, aggregation: Option<&str>, rules: &[(&str, &str)]) -> String {
    let aggregation = aggregation
        .map(|a| format!(" aggregation=\"{}\"", a))
        .unwrap_or_default();
    let rules: String = rules
        .iter()
        .map(|(test, output)| {
            format!(
                "<rule><inputEntry><text>{}</text></inputEntry>\
                 <outputEntry><text>{}</text></outputEntry></rule>",
                test, output
            )
        })
        .collect();
    format!(
        r#"<definitions name="m">
  <decision name="D">
    <decisionTable hitPolicy="{}"{}>
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output name="out"/>
      {}
    </decisionTable>
  </decision>
</definitions>"#,
        hit_policy, aggregation, rules
    )
}

fn run(xml: &str, input: serde_json::Value) -> serde_json::Value {
    let mut engine = Engine::new();
    engine.load_model(xml).expect("model should load");
    engine.evaluate(&input)["D"].clone()
}

#[test]
fn unique_returns_the_single_match() {
    let xml = table_xml(
        "UNIQUE",
        None,
        &[("&lt; 10", "\"small\""), ("&gt;= 10", "\"big\"")],
    );
    assert_eq!(run(&xml, json!({"x": 3})), json!("small"));
    assert_eq!(run(&xml, json!({"x": 30})), json!("big"));
}

#[test]
fn unique_with_no_match_is_null() {
    let xml = table_xml("UNIQUE", None, &[("&lt; 10", "1")]);
    assert_eq!(run(&xml, json!({"x": 50})), json!(null));
}

#[test]
fn unique_violation_nulls_the_decision_and_reports() {
    let xml = table_xml("UNIQUE", None, &[("&gt; 0", "1"), ("&gt; 1", "2")]);
    let mut engine = Engine::new();
    engine.load_model(&xml).unwrap();
    let result = engine.evaluate(&json!({"x": 5}));
    assert_eq!(result["D"], json!(null));
    let diags = engine.diagnostics();
    assert!(diags
        .iter()
        .any(|d| d.severity == Severity::Error && d.message.contains("UNIQUE")));
}

#[test]
fn first_takes_the_least_indexed_match() {
    // age category: <18 Minor, [18..65) Adult, >=65 Senior
    let xml = table_xml(
        "FIRST",
        None,
        &[
            ("&lt; 18", "\"Minor\""),
            ("[18..65)", "\"Adult\""),
            ("&gt;= 65", "\"Senior\""),
        ],
    );
    assert_eq!(run(&xml, json!({"x": 10})), json!("Minor"));
    assert_eq!(run(&xml, json!({"x": 25})), json!("Adult"));
    assert_eq!(run(&xml, json!({"x": 70})), json!("Senior"));
    assert_eq!(run(&xml, json!({"x": 18})), json!("Adult"));
    assert_eq!(run(&xml, json!({"x": 65})), json!("Senior"));
}

#[test]
fn rule_order_lists_matches_in_definition_order() {
    let xml = table_xml(
        "RULE ORDER",
        None,
        &[
            ("&gt;= 18", "\"Best\""),
            ("&gt;= 12", "\"Standard\""),
            ("&lt; 12", "\"Standard\""),
        ],
    );
    assert_eq!(run(&xml, json!({"x": 19})), json!(["Best", "Standard"]));
    assert_eq!(run(&xml, json!({"x": 13})), json!(["Standard"]));
    assert_eq!(run(&xml, json!({"x": 10})), json!(["Standard"]));
}

#[test]
fn collect_without_aggregation_is_a_list() {
    let xml = table_xml("COLLECT", None, &[("&gt; 0", "10"), ("&gt; 1", "20")]);
    assert_eq!(run(&xml, json!({"x": 5})), json!([10, 20]));
    assert_eq!(run(&xml, json!({"x": 0})), json!([]));
}

#[test]
fn collect_sum_adds_matching_outputs() {
    let xml = table_xml(
        "COLLECT",
        Some("SUM"),
        &[("&gt; 0", "10"), ("&gt; 0", "20"), ("&gt; 0", "30")],
    );
    assert_eq!(run(&xml, json!({"x": 1})), json!(60));
}

#[test]
fn collect_sum_skips_null_outputs() {
    let xml = table_xml(
        "COLLECT",
        Some("SUM"),
        &[("&gt; 0", "30"), ("&gt; 0", "null")],
    );
    assert_eq!(run(&xml, json!({"x": 1})), json!(30));
}

#[test]
fn collect_count_min_max() {
    let rules: &[(&str, &str)] = &[("&gt; 0", "10"), ("&gt; 0", "5"), ("&gt; 1", "20")];
    let count = table_xml("COLLECT", Some("COUNT"), rules);
    assert_eq!(run(&count, json!({"x": 5})), json!(3));
    assert_eq!(run(&count, json!({"x": 1})), json!(2));
    let min = table_xml("COLLECT", Some("MIN"), rules);
    assert_eq!(run(&min, json!({"x": 5})), json!(5));
    let max = table_xml("COLLECT", Some("MAX"), rules);
    assert_eq!(run(&max, json!({"x": 5})), json!(20));
}

#[test]
fn any_requires_agreeing_outputs() {
    let agree = table_xml("ANY", None, &[("&gt; 0", "\"yes\""), ("&gt; 1", "\"yes\"")]);
    assert_eq!(run(&agree, json!({"x": 5})), json!("yes"));

    let disagree = table_xml("ANY", None, &[("&gt; 0", "\"yes\""), ("&gt; 1", "\"no\"")]);
    let mut engine = Engine::new();
    engine.load_model(&disagree).unwrap();
    assert_eq!(engine.evaluate(&json!({"x": 5}))["D"], json!(null));
    assert!(engine
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("ANY")));
}

fn priority_xml(hit_policy: &str) -> String {
    format!(
        r#"<definitions name="m">
  <decision name="D">
    <decisionTable hitPolicy="{}">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output name="out">
        <outputValues><text>"Best", "Standard", "Poor"</text></outputValues>
      </output>
      <rule>
        <inputEntry><text>&gt;= 0</text></inputEntry>
        <outputEntry><text>"Poor"</text></outputEntry>
      </rule>
      <rule>
        <inputEntry><text>&gt;= 10</text></inputEntry>
        <outputEntry><text>"Standard"</text></outputEntry>
      </rule>
      <rule>
        <inputEntry><text>&gt;= 100</text></inputEntry>
        <outputEntry><text>"Best"</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
</definitions>"#,
        hit_policy
    )
}

#[test]
fn priority_picks_highest_declared_value() {
    let xml = priority_xml("PRIORITY");
    assert_eq!(run(&xml, json!({"x": 500})), json!("Best"));
    assert_eq!(run(&xml, json!({"x": 50})), json!("Standard"));
    assert_eq!(run(&xml, json!({"x": 5})), json!("Poor"));
    assert_eq!(run(&xml, json!({"x": -5})), json!(null));
}

#[test]
fn output_order_sorts_by_declared_priority() {
    let xml = priority_xml("OUTPUT ORDER");
    assert_eq!(
        run(&xml, json!({"x": 500})),
        json!(["Best", "Standard", "Poor"])
    );
    assert_eq!(run(&xml, json!({"x": 50})), json!(["Standard", "Poor"]));
}

#[test]
fn multi_output_rules_shape_into_contexts() {
    let xml = r#"<definitions name="m">
  <decision name="D">
    <decisionTable hitPolicy="FIRST">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output name="grade"/>
      <output name="limit"/>
      <rule>
        <inputEntry><text>&gt;= 0</text></inputEntry>
        <outputEntry><text>"A"</text></outputEntry>
        <outputEntry><text>1000</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
</definitions>"#;
    assert_eq!(
        run(xml, json!({"x": 1})),
        json!({"grade": "A", "limit": 1000})
    );
}

#[test]
fn wildcard_matches_anything() {
    let xml = table_xml("FIRST", None, &[("-", "\"always\"")]);
    assert_eq!(run(&xml, json!({"x": 1})), json!("always"));
    assert_eq!(run(&xml, json!({"x": null})), json!("always"));
    assert_eq!(run(&xml, json!({})), json!("always"));
}

#[test]
fn disjunction_and_negation_in_cells() {
    let xml = table_xml(
        "FIRST",
        None,
        &[("1, 2, 3", "\"low\""), ("not(4)", "\"not four\"")],
    );
    assert_eq!(run(&xml, json!({"x": 2})), json!("low"));
    assert_eq!(run(&xml, json!({"x": 9})), json!("not four"));
    assert_eq!(run(&xml, json!({"x": 4})), json!(null));
}

#[test]
fn unknown_input_does_not_match_comparisons() {
    let xml = table_xml(
        "FIRST",
        None,
        &[("&gt;= 18", "\"adult\""), ("-", "\"fallback\"")],
    );
    // string input is incomparable with the numeric bound
    assert_eq!(run(&xml, json!({"x": "nope"})), json!("fallback"));
}

#[test]
fn hit_policy_override_forces_all_tables() {
    let xml = table_xml(
        "FIRST",
        None,
        &[("&gt;= 18", "\"Best\""), ("&gt;= 12", "\"Standard\"")],
    );
    let mut engine = Engine::new();
    engine.load_model(&xml).unwrap();
    let options = EvalOptions {
        override_hit_policy: true,
        hit_policy_override: HitPolicy::RuleOrder,
        ..EvalOptions::default()
    };
    assert_eq!(
        engine.evaluate_with_options(&json!({"x": 19}), &options)["D"],
        json!(["Best", "Standard"])
    );
    // without the flag the declared policy stands
    assert_eq!(engine.evaluate(&json!({"x": 19}))["D"], json!("Best"));
}

#[test]
fn collect_aggregation_override() {
    let xml = table_xml("COLLECT", None, &[("&gt; 0", "10"), ("&gt; 0", "20")]);
    let mut engine = Engine::new();
    engine.load_model(&xml).unwrap();
    let options = EvalOptions {
        collect_aggregation: Some(verdict_engine::Aggregation::Sum),
        ..EvalOptions::default()
    };
    assert_eq!(
        engine.evaluate_with_options(&json!({"x": 1}), &options)["D"],
        json!(30)
    );
}

#[test]
fn debug_output_traces_rule_matches() {
    let xml = table_xml("FIRST", None, &[("&lt; 10", "1"), ("&gt;= 10", "2")]);
    let mut engine = Engine::new();
    engine.load_model(&xml).unwrap();
    let options = EvalOptions {
        debug_output: true,
        ..EvalOptions::default()
    };
    engine.evaluate_with_options(&json!({"x": 3}), &options);
    let notes: Vec<_> = engine
        .diagnostics()
        .iter()
        .filter(|d| d.severity == Severity::Note)
        .collect();
    assert_eq!(notes.len(), 2);
    assert!(notes[0].message.contains("rule 1 matched"));
    assert!(notes[1].message.contains("did not match"));
}

#[test]
fn table_inputs_are_full_expressions() {
    let xml = r#"<definitions name="m">
  <decision name="D">
    <decisionTable hitPolicy="FIRST">
      <input label="total">
        <inputExpression><text>price * quantity</text></inputExpression>
      </input>
      <output/>
      <rule>
        <inputEntry><text>&gt; 100</text></inputEntry>
        <outputEntry><text>"bulk"</text></outputEntry>
      </rule>
      <rule>
        <inputEntry><text>-</text></inputEntry>
        <outputEntry><text>"retail"</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
</definitions>"#;
    assert_eq!(run(xml, json!({"price": 30, "quantity": 5})), json!("bulk"));
    assert_eq!(run(xml, json!({"price": 2, "quantity": 5})), json!("retail"));
}
