//! DMN XML reader.
//!
//! A namespace-agnostic pull parser: elements are recognized by local name
//! only, so DMN 1.1 through 1.5 namespaces (and none at all) read the same.
//! FEEL text inside cells is parsed here, at load time; a cell that fails to
//! parse rejects its enclosing decision.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::str::FromStr;

use crate::model::{
    Aggregation, BkmDef, Decision, DecisionTable, DmnModel, HitPolicy, InputClause, LiteralDecision,
    LoadError, OutputClause, Rule,
};
use verdict_feel::ast::{UnaryTest, UnaryTests};
use verdict_feel::{parse_expression, parse_unary_tests, Span};

type XmlReader<'a> = Reader<&'a [u8]>;

pub fn parse_model(xml: &str) -> Result<DmnModel, LoadError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut model = DmnModel {
        name: String::new(),
        decisions: Vec::new(),
        bkms: Vec::new(),
    };
    loop {
        match read_event(&mut reader)? {
            Event::Start(e) => match local(&e).as_str() {
                "definitions" => {
                    if let Some(name) = attr(&e, "name")? {
                        model.name = name;
                    }
                }
                "decision" => model.decisions.push(read_decision(&mut reader, &e)?),
                "businessKnowledgeModel" => model.bkms.push(read_bkm(&mut reader, &e)?),
                _ => {}
            },
            Event::Empty(e) if local(&e) == "decision" => {
                return Err(LoadError::Model(format!(
                    "decision '{}' has neither a decision table nor a literal expression",
                    name_attr(&e)?
                )))
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(model)
}

fn read_event<'a>(reader: &mut XmlReader<'a>) -> Result<Event<'a>, LoadError> {
    reader.read_event().map_err(|e| LoadError::Xml(e.to_string()))
}

fn local(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, LoadError> {
    for a in e.attributes() {
        let a = a.map_err(|err| LoadError::Xml(err.to_string()))?;
        if a.key.local_name().as_ref() == name.as_bytes() {
            let value = a
                .unescape_value()
                .map_err(|err| LoadError::Xml(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn name_attr(e: &BytesStart<'_>) -> Result<String, LoadError> {
    if let Some(name) = attr(e, "name")? {
        return Ok(name);
    }
    if let Some(id) = attr(e, "id")? {
        return Ok(id);
    }
    Err(LoadError::MissingAttribute {
        element: local(e),
        attribute: "name".to_string(),
    })
}

/// Collect character data until the end of `element`.
fn read_text_until(reader: &mut XmlReader<'_>, element: &str) -> Result<String, LoadError> {
    let mut out = String::new();
    loop {
        match read_event(reader)? {
            Event::Text(t) => {
                out.push_str(&t.unescape().map_err(|e| LoadError::Xml(e.to_string()))?)
            }
            Event::CData(c) => out.push_str(&String::from_utf8_lossy(c.into_inner().as_ref())),
            Event::End(e) if e.local_name().as_ref() == element.as_bytes() => break,
            Event::Eof => return Err(LoadError::Xml(format!("unclosed <{}>", element))),
            _ => {}
        }
    }
    Ok(out)
}

/// Find the nested `<text>` inside `element` and return its content.
fn read_nested_text(reader: &mut XmlReader<'_>, element: &str) -> Result<String, LoadError> {
    let mut out = String::new();
    loop {
        match read_event(reader)? {
            Event::Start(e) if local(&e) == "text" => {
                out = read_text_until(reader, "text")?;
            }
            Event::End(e) if e.local_name().as_ref() == element.as_bytes() => break,
            Event::Eof => return Err(LoadError::Xml(format!("unclosed <{}>", element))),
            _ => {}
        }
    }
    Ok(out)
}

fn read_decision(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<Decision, LoadError> {
    let name = name_attr(start)?;
    let mut table: Option<DecisionTable> = None;
    let mut literal_text: Option<String> = None;
    loop {
        match read_event(reader)? {
            Event::Start(e) => match local(&e).as_str() {
                "decisionTable" => table = Some(read_table(reader, &e, &name)?),
                "literalExpression" => {
                    literal_text = Some(read_nested_text(reader, "literalExpression")?)
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"decision" => break,
            Event::Eof => return Err(LoadError::Xml("unclosed <decision>".to_string())),
            _ => {}
        }
    }
    if let Some(table) = table {
        return Ok(Decision::Table(table));
    }
    if let Some(text) = literal_text {
        let expression = parse_expression(&text).map_err(|err| LoadError::Feel {
            decision: name.clone(),
            source_text: text.clone(),
            err,
        })?;
        return Ok(Decision::Literal(LiteralDecision {
            name,
            expression,
            text,
        }));
    }
    Err(LoadError::Model(format!(
        "decision '{}' has neither a decision table nor a literal expression",
        name
    )))
}

fn read_table(
    reader: &mut XmlReader<'_>,
    start: &BytesStart<'_>,
    decision: &str,
) -> Result<DecisionTable, LoadError> {
    let hit_policy = match attr(start, "hitPolicy")? {
        Some(text) => HitPolicy::from_str(&text)
            .map_err(|_| LoadError::Model(format!("unknown hit policy '{}'", text)))?,
        None => HitPolicy::default(),
    };
    let aggregation = match attr(start, "aggregation")? {
        Some(text) if !text.is_empty() => Some(
            Aggregation::from_str(&text)
                .map_err(|_| LoadError::Model(format!("unknown aggregation '{}'", text)))?,
        ),
        _ => None,
    };

    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut raw_rules: Vec<(Vec<String>, Vec<String>)> = Vec::new();
    loop {
        match read_event(reader)? {
            Event::Start(e) => match local(&e).as_str() {
                "input" => {
                    let label = attr(&e, "label")?.unwrap_or_default();
                    let text = read_input_expression(reader)?;
                    let expression = parse_expression(&text).map_err(|err| LoadError::Feel {
                        decision: decision.to_string(),
                        source_text: text.clone(),
                        err,
                    })?;
                    inputs.push(InputClause {
                        label,
                        expression,
                        expression_text: text,
                    });
                }
                "output" => {
                    let name = attr(&e, "name")?.unwrap_or_default();
                    let values_text = read_output_values(reader)?;
                    outputs.push(OutputClause {
                        name,
                        priority_values: split_priorities(&values_text),
                    });
                }
                "rule" => raw_rules.push(read_rule(reader)?),
                _ => {}
            },
            Event::Empty(e) => match local(&e).as_str() {
                "output" => outputs.push(OutputClause {
                    name: attr(&e, "name")?.unwrap_or_default(),
                    priority_values: Vec::new(),
                }),
                "input" => {
                    return Err(LoadError::Model(format!(
                        "decision '{}': input column without an expression",
                        decision
                    )))
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"decisionTable" => break,
            Event::Eof => return Err(LoadError::Xml("unclosed <decisionTable>".to_string())),
            _ => {}
        }
    }

    if outputs.is_empty() {
        outputs.push(OutputClause {
            name: String::new(),
            priority_values: Vec::new(),
        });
    }

    if matches!(hit_policy, HitPolicy::Priority | HitPolicy::OutputOrder) {
        for output in &outputs {
            if output.priority_values.is_empty() {
                return Err(LoadError::MissingPriorities {
                    decision: decision.to_string(),
                    output: output.name.clone(),
                    policy: hit_policy,
                });
            }
        }
    }

    let mut rules = Vec::new();
    for (index, (test_texts, output_texts)) in raw_rules.into_iter().enumerate() {
        if test_texts.len() != inputs.len() || output_texts.len() != outputs.len() {
            return Err(LoadError::RuleArity {
                decision: decision.to_string(),
                rule: index + 1,
                expected: inputs.len(),
                found: test_texts.len(),
            });
        }
        let mut tests = Vec::with_capacity(test_texts.len());
        for text in &test_texts {
            tests.push(parse_entry_tests(text).map_err(|err| LoadError::Feel {
                decision: decision.to_string(),
                source_text: text.clone(),
                err,
            })?);
        }
        let mut rule_outputs = Vec::with_capacity(output_texts.len());
        for text in &output_texts {
            rule_outputs.push(parse_expression(text).map_err(|err| LoadError::Feel {
                decision: decision.to_string(),
                source_text: text.clone(),
                err,
            })?);
        }
        rules.push(Rule {
            tests,
            test_texts,
            outputs: rule_outputs,
            output_texts,
        });
    }

    Ok(DecisionTable {
        name: decision.to_string(),
        inputs,
        outputs,
        rules,
        hit_policy,
        aggregation,
    })
}

/// An empty input entry is a wildcard.
fn parse_entry_tests(text: &str) -> Result<UnaryTests, verdict_feel::FeelError> {
    if text.trim().is_empty() {
        return Ok(UnaryTests {
            negated: false,
            alternatives: vec![UnaryTest::Wildcard(Span::dummy())],
            span: Span::dummy(),
        });
    }
    parse_unary_tests(text)
}

/// Inside `<input>`: pull the text of `<inputExpression>`.
fn read_input_expression(reader: &mut XmlReader<'_>) -> Result<String, LoadError> {
    let mut out = String::new();
    loop {
        match read_event(reader)? {
            Event::Start(e) if local(&e) == "inputExpression" => {
                out = read_nested_text(reader, "inputExpression")?;
            }
            Event::End(e) if e.local_name().as_ref() == b"input" => break,
            Event::Eof => return Err(LoadError::Xml("unclosed <input>".to_string())),
            _ => {}
        }
    }
    if out.trim().is_empty() {
        return Err(LoadError::Model("input column without an expression".to_string()));
    }
    Ok(out)
}

/// Inside `<output>`: pull the text of `<outputValues>` if present.
fn read_output_values(reader: &mut XmlReader<'_>) -> Result<String, LoadError> {
    let mut out = String::new();
    loop {
        match read_event(reader)? {
            Event::Start(e) if local(&e) == "outputValues" => {
                out = read_nested_text(reader, "outputValues")?;
            }
            Event::End(e) if e.local_name().as_ref() == b"output" => break,
            Event::Eof => return Err(LoadError::Xml("unclosed <output>".to_string())),
            _ => {}
        }
    }
    Ok(out)
}

/// Priority lists are written as a comma-separated row of (usually quoted)
/// values: `"Best", "Standard"`.
fn split_priorities(text: &str) -> Vec<String> {
    text.split(',')
        .map(|part| part.trim().trim_matches('"').to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

fn read_rule(reader: &mut XmlReader<'_>) -> Result<(Vec<String>, Vec<String>), LoadError> {
    let mut tests = Vec::new();
    let mut outputs = Vec::new();
    loop {
        match read_event(reader)? {
            Event::Start(e) => match local(&e).as_str() {
                "inputEntry" => tests.push(read_nested_text(reader, "inputEntry")?),
                "outputEntry" => outputs.push(read_nested_text(reader, "outputEntry")?),
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"rule" => break,
            Event::Eof => return Err(LoadError::Xml("unclosed <rule>".to_string())),
            _ => {}
        }
    }
    Ok((tests, outputs))
}

fn read_bkm(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<BkmDef, LoadError> {
    let name = name_attr(start)?;
    let mut parameters = Vec::new();
    let mut body_text = String::new();
    loop {
        match read_event(reader)? {
            Event::Start(e) => match local(&e).as_str() {
                "formalParameter" => {
                    parameters.push(name_attr(&e)?);
                }
                "literalExpression" => {
                    body_text = read_nested_text(reader, "literalExpression")?;
                }
                _ => {}
            },
            Event::Empty(e) if local(&e) == "formalParameter" => {
                parameters.push(name_attr(&e)?);
            }
            Event::End(e) if e.local_name().as_ref() == b"businessKnowledgeModel" => break,
            Event::Eof => {
                return Err(LoadError::Xml("unclosed <businessKnowledgeModel>".to_string()))
            }
            _ => {}
        }
    }
    if body_text.trim().is_empty() {
        return Err(LoadError::Model(format!(
            "business knowledge model '{}' has no body expression",
            name
        )));
    }
    let body = parse_expression(&body_text).map_err(|err| LoadError::Feel {
        decision: name.clone(),
        source_text: body_text.clone(),
        err,
    })?;
    Ok(BkmDef {
        name,
        parameters,
        body,
        text: body_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"
<definitions xmlns="https://www.omg.org/spec/DMN/20230324/MODEL/" name="simple">
  <decision id="d1" name="Greeting">
    <literalExpression><text>"Hello " + Full Name</text></literalExpression>
  </decision>
  <decision id="d2" name="Category">
    <decisionTable hitPolicy="FIRST">
      <input label="age"><inputExpression><text>age</text></inputExpression></input>
      <output name="category"/>
      <rule>
        <inputEntry><text>&lt; 18</text></inputEntry>
        <outputEntry><text>"Minor"</text></outputEntry>
      </rule>
      <rule>
        <inputEntry><text>[18..65)</text></inputEntry>
        <outputEntry><text>"Adult"</text></outputEntry>
      </rule>
      <rule>
        <inputEntry><text>&gt;= 65</text></inputEntry>
        <outputEntry><text>"Senior"</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
  <businessKnowledgeModel name="double it">
    <encapsulatedLogic>
      <formalParameter name="n"/>
      <literalExpression><text>n * 2</text></literalExpression>
    </encapsulatedLogic>
  </businessKnowledgeModel>
</definitions>
"#;

    #[test]
    fn parses_decisions_and_bkms() {
        let model = parse_model(SIMPLE).unwrap();
        assert_eq!(model.name, "simple");
        assert_eq!(model.decisions.len(), 2);
        assert_eq!(model.decisions[0].name(), "Greeting");
        assert!(matches!(model.decisions[0], Decision::Literal(_)));
        match &model.decisions[1] {
            Decision::Table(t) => {
                assert_eq!(t.hit_policy, HitPolicy::First);
                assert_eq!(t.inputs.len(), 1);
                assert_eq!(t.rules.len(), 3);
                assert_eq!(t.outputs[0].name, "category");
            }
            other => panic!("expected table, got {:?}", other),
        }
        assert_eq!(model.bkms.len(), 1);
        assert_eq!(model.bkms[0].parameters, vec!["n".to_string()]);
    }

    #[test]
    fn cdata_cells_read() {
        let xml = r#"
<definitions name="m">
  <decision name="D">
    <literalExpression><text><![CDATA[1 < 2]]></text></literalExpression>
  </decision>
</definitions>"#;
        let model = parse_model(xml).unwrap();
        assert_eq!(model.decisions.len(), 1);
    }

    #[test]
    fn empty_input_entry_is_wildcard() {
        let xml = r#"
<definitions name="m">
  <decision name="D">
    <decisionTable hitPolicy="FIRST">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output/>
      <rule>
        <inputEntry><text></text></inputEntry>
        <outputEntry><text>1</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
</definitions>"#;
        let model = parse_model(xml).unwrap();
        match &model.decisions[0] {
            Decision::Table(t) => {
                assert!(matches!(
                    t.rules[0].tests[0].alternatives[0],
                    UnaryTest::Wildcard(_)
                ));
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn bad_feel_rejects_decision() {
        let xml = r#"
<definitions name="m">
  <decision name="Broken">
    <literalExpression><text>1 + + 2</text></literalExpression>
  </decision>
</definitions>"#;
        assert!(matches!(
            parse_model(xml),
            Err(LoadError::Feel { decision, .. }) if decision == "Broken"
        ));
    }

    #[test]
    fn priority_without_output_values_is_rejected() {
        let xml = r#"
<definitions name="m">
  <decision name="P">
    <decisionTable hitPolicy="PRIORITY">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output name="out"/>
      <rule>
        <inputEntry><text>-</text></inputEntry>
        <outputEntry><text>"a"</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
</definitions>"#;
        assert!(matches!(
            parse_model(xml),
            Err(LoadError::MissingPriorities { .. })
        ));
    }

    #[test]
    fn rule_arity_is_enforced() {
        let xml = r#"
<definitions name="m">
  <decision name="A">
    <decisionTable hitPolicy="FIRST">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <input label="y"><inputExpression><text>y</text></inputExpression></input>
      <output/>
      <rule>
        <inputEntry><text>1</text></inputEntry>
        <outputEntry><text>1</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
</definitions>"#;
        assert!(matches!(parse_model(xml), Err(LoadError::RuleArity { .. })));
    }

    #[test]
    fn output_values_become_priorities() {
        let xml = r#"
<definitions name="m">
  <decision name="P">
    <decisionTable hitPolicy="PRIORITY">
      <input label="x"><inputExpression><text>x</text></inputExpression></input>
      <output name="out">
        <outputValues><text>"Best", "Standard"</text></outputValues>
      </output>
      <rule>
        <inputEntry><text>-</text></inputEntry>
        <outputEntry><text>"Standard"</text></outputEntry>
      </rule>
    </decisionTable>
  </decision>
</definitions>"#;
        let model = parse_model(xml).unwrap();
        match &model.decisions[0] {
            Decision::Table(t) => {
                assert_eq!(t.outputs[0].priority_values, vec!["Best", "Standard"]);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }
}
