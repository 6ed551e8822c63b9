//! End-to-end engine behavior: XML + JSON in, JSON out.

use serde_json::json;
use verdict_engine::{evaluate, Engine, EvalOptions, LoadError, Severity};

const GREETING: &str = r#"
<definitions name="greetings">
  <decision name="Greeting">
    <literalExpression><text>"Hello " + Full Name</text></literalExpression>
  </decision>
</definitions>"#;

#[test]
fn literal_expression_greets() {
    let mut engine = Engine::new();
    engine.load_model(GREETING).unwrap();
    let result = engine.evaluate(&json!({"Full Name": "John Doe"}));
    assert_eq!(result, json!({"Greeting": "Hello John Doe"}));
}

#[test]
fn name_tolerance_spans_underscores_and_case() {
    let xml = r#"
<definitions name="m">
  <decision name="Echo">
    <literalExpression><text>Input With Spaces</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    assert_eq!(
        engine.evaluate(&json!({"input_with_spaces": 42})),
        json!({"Echo": 42})
    );
    assert_eq!(
        engine.evaluate(&json!({"INPUT WITH SPACES": 7})),
        json!({"Echo": 7})
    );
}

#[test]
fn ternary_guard_decision() {
    let xml = r#"
<definitions name="m">
  <decision name="Guard">
    <literalExpression><text>A and B</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    assert_eq!(
        engine.evaluate(&json!({"A": true, "B": null})),
        json!({"Guard": null})
    );
    assert_eq!(
        engine.evaluate(&json!({"A": false, "B": null})),
        json!({"Guard": false})
    );
}

#[test]
fn decisions_evaluate_in_registration_order_and_see_earlier_results() {
    let xml = r#"
<definitions name="m">
  <decision name="base">
    <literalExpression><text>amount * 2</text></literalExpression>
  </decision>
  <decision name="with bonus">
    <literalExpression><text>base + 1</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    let result = engine.evaluate(&json!({"amount": 10}));
    assert_eq!(result, json!({"base": 20, "with bonus": 21}));
    // key order mirrors registration order
    let keys: Vec<_> = result.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["base".to_string(), "with bonus".to_string()]);
}

#[test]
fn one_broken_decision_does_not_take_down_the_rest() {
    let xml = r#"
<definitions name="m">
  <decision name="Broken">
    <decisionTable hitPolicy="UNIQUE">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output/>
      <rule><inputEntry><text>&gt; 0</text></inputEntry><outputEntry><text>1</text></outputEntry></rule>
      <rule><inputEntry><text>&gt; 1</text></inputEntry><outputEntry><text>2</text></outputEntry></rule>
    </decisionTable>
  </decision>
  <decision name="Fine">
    <literalExpression><text>x + 1</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    let result = engine.evaluate(&json!({"x": 5}));
    assert_eq!(result["Broken"], json!(null));
    assert_eq!(result["Fine"], json!(6));
    assert!(engine
        .diagnostics()
        .iter()
        .any(|d| d.decision.as_deref() == Some("Broken") && d.severity == Severity::Error));
}

#[test]
fn removing_a_decision_leaves_others_untouched() {
    let mut engine = Engine::new();
    engine.load_model(GREETING).unwrap();
    engine
        .load_model(
            r#"<definitions name="m2">
  <decision name="Two"><literalExpression><text>1 + 1</text></literalExpression></decision>
</definitions>"#,
        )
        .unwrap();
    assert_eq!(
        engine.decision_names(),
        vec!["Greeting".to_string(), "Two".to_string()]
    );
    let before = engine.evaluate(&json!({"Full Name": "A"}));
    assert_eq!(before["Two"], json!(2));

    assert!(engine.remove_decision("Greeting"));
    assert!(!engine.remove_decision("Greeting"));
    let after = engine.evaluate(&json!({"Full Name": "A"}));
    assert_eq!(after, json!({"Two": 2}));
}

#[test]
fn duplicate_names_overwrite_with_a_warning() {
    let mut engine = Engine::new();
    engine.load_model(GREETING).unwrap();
    engine
        .load_model(
            r#"<definitions name="m2">
  <decision name="Greeting"><literalExpression><text>"Hi"</text></literalExpression></decision>
</definitions>"#,
        )
        .unwrap();
    assert_eq!(engine.decision_names().len(), 1);
    assert_eq!(
        engine.evaluate(&json!({}))["Greeting"],
        json!("Hi")
    );
    assert!(engine
        .diagnostics()
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("duplicate")));
}

#[test]
fn bkms_are_callable_from_decisions() {
    let xml = r#"
<definitions name="m">
  <businessKnowledgeModel name="double it">
    <encapsulatedLogic>
      <formalParameter name="n"/>
      <literalExpression><text>n * 2</text></literalExpression>
    </encapsulatedLogic>
  </businessKnowledgeModel>
  <decision name="Result">
    <literalExpression><text>double it(value) + 1</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    assert_eq!(engine.evaluate(&json!({"value": 21})), json!({"Result": 43}));
    assert_eq!(engine.bkm_names(), vec!["double it".to_string()]);
}

#[test]
fn recursive_bkm_runs_within_the_depth_cap() {
    let xml = r#"
<definitions name="m">
  <businessKnowledgeModel name="fact">
    <encapsulatedLogic>
      <formalParameter name="n"/>
      <literalExpression><text>if n &lt;= 1 then 1 else n * fact(n - 1)</text></literalExpression>
    </encapsulatedLogic>
  </businessKnowledgeModel>
  <decision name="F">
    <literalExpression><text>fact(n)</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    assert_eq!(engine.evaluate(&json!({"n": 5}))["F"], json!(120));
}

#[test]
fn runaway_bkm_recursion_surfaces_a_limit_error() {
    let xml = r#"
<definitions name="m">
  <businessKnowledgeModel name="spin">
    <encapsulatedLogic>
      <formalParameter name="n"/>
      <literalExpression><text>spin(n + 1)</text></literalExpression>
    </encapsulatedLogic>
  </businessKnowledgeModel>
  <decision name="S">
    <literalExpression><text>spin(0)</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    let result = engine.evaluate(&json!({}));
    assert_eq!(result["S"], json!(null));
    assert!(engine
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("recursion limit")));
}

#[test]
fn decision_cycles_are_rejected_at_load() {
    let xml = r#"
<definitions name="m">
  <decision name="A">
    <literalExpression><text>B + 1</text></literalExpression>
  </decision>
  <decision name="B">
    <literalExpression><text>A + 1</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    match engine.load_model(xml) {
        Err(LoadError::Cycle(chain)) => {
            assert!(chain.contains("A"));
            assert!(chain.contains("B"));
        }
        other => panic!("expected cycle rejection, got {:?}", other.err()),
    }
    // nothing was registered
    assert!(engine.decision_names().is_empty());
}

#[test]
fn strict_mode_reports_coercion_failures() {
    let xml = r#"
<definitions name="m">
  <decision name="Calc">
    <literalExpression><text>flavor * 2</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();

    // lenient: silently null
    let lenient = engine.evaluate(&json!({"flavor": "vanilla"}));
    assert_eq!(lenient["Calc"], json!(null));
    assert!(engine.take_diagnostics().is_empty());

    let options = EvalOptions {
        strict_mode: true,
        ..EvalOptions::default()
    };
    let strict = engine.evaluate_with_options(&json!({"flavor": "vanilla"}), &options);
    assert_eq!(strict["Calc"], json!(null));
    assert!(engine
        .diagnostics()
        .iter()
        .any(|d| d.severity == Severity::Error && d.message.contains("type mismatch")));
}

#[test]
fn stateless_entry_loads_and_evaluates() {
    let result = evaluate(GREETING, &json!({"Full Name": "Ada"})).unwrap();
    assert_eq!(result, json!({"Greeting": "Hello Ada"}));
}

#[test]
fn stateless_entry_propagates_load_errors() {
    assert!(evaluate("<definitions><decision name='X'/></definitions>", &json!({})).is_err());
}

#[test]
fn non_object_input_warns_and_evaluates_empty() {
    let xml = r#"
<definitions name="m">
  <decision name="C"><literalExpression><text>1 + 1</text></literalExpression></decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    let result = engine.evaluate(&json!([1, 2]));
    assert_eq!(result, json!({"C": 2}));
    assert!(engine
        .diagnostics()
        .iter()
        .any(|d| d.severity == Severity::Warning));
}

#[test]
fn validate_models_reports_structural_issues() {
    let xml = r#"
<definitions name="m">
  <decision name="Empty">
    <decisionTable hitPolicy="FIRST">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output/>
    </decisionTable>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    let issues = engine.validate_models();
    assert!(issues
        .iter()
        .any(|d| d.decision.as_deref() == Some("Empty") && d.message.contains("no rules")));
}

#[test]
fn clear_resets_everything() {
    let mut engine = Engine::new();
    engine.load_model(GREETING).unwrap();
    engine.clear();
    assert!(engine.decision_names().is_empty());
    assert!(engine.bkm_names().is_empty());
    assert_eq!(engine.evaluate(&json!({})), json!({}));
}

#[test]
fn nested_contexts_and_lists_flow_through() {
    let xml = r#"
<definitions name="m">
  <decision name="Eligible">
    <literalExpression><text>applicant.age &gt;= 18 and sum(applicant.scores) &gt; 100</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    let input = json!({"applicant": {"age": 25, "scores": [40, 50, 30]}});
    assert_eq!(engine.evaluate(&input), json!({"Eligible": true}));
}

#[test]
fn results_serialize_lists_and_contexts() {
    let xml = r#"
<definitions name="m">
  <decision name="Pairs">
    <literalExpression><text>for x in [1, 2] return {n: x, double: x * 2}</text></literalExpression>
  </decision>
</definitions>"#;
    let mut engine = Engine::new();
    engine.load_model(xml).unwrap();
    assert_eq!(
        engine.evaluate(&json!({})),
        json!({"Pairs": [{"n": 1, "double": 2}, {"n": 2, "double": 4}]})
    );
}
