// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use std::env;

use anyhow::{bail, Result};
use relish::*;
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

// Process test value specified in yaml to interpret special encodings.
pub fn process_value(v: &Value) -> Value {
    match v {
        // Handle Undefined encoded as a string "#undefined"
        Value::String(s) if s.as_ref() == "#undefined" => Value::Undefined,

        Value::Array(items) => Value::from(items.iter().map(process_value).collect::<Vec<_>>()),

        Value::Object(fields) => {
            let mut object = Map::new();
            for (key, value) in fields.iter() {
                object.insert(key.clone(), process_value(value));
            }
            Value::from(object)
        }

        _ => v.clone(),
    }
}

fn display_values(c: &Value, e: &Value) -> Result<String> {
    Ok(format!(
        "\nleft  = {}\nright = {}\n",
        serde_json::to_string_pretty(c)?,
        serde_json::to_string_pretty(e)?
    ))
}

// Helper function to match computed and expected values.
// On mismatch, prints the failing sub-value instead of the whole value.
fn match_values_impl(computed: &Value, expected: &Value) -> Result<()> {
    match (computed, expected) {
        (Value::Array(a1), Value::Array(a2)) => {
            if a1.len() != a2.len() {
                bail!(
                    "array length mismatch: {} != {}{}",
                    a1.len(),
                    a2.len(),
                    display_values(computed, expected)?
                );
            }
            for (v1, v2) in a1.iter().zip(a2.iter()) {
                match_values_impl(v1, v2)?;
            }
            Ok(())
        }

        (Value::Object(o1), Value::Object(o2)) => {
            if o1.len() != o2.len() {
                bail!(
                    "object length mismatch: {} != {}{}",
                    o1.len(),
                    o2.len(),
                    display_values(computed, expected)?
                );
            }
            for (k1, v1) in o1.iter() {
                match o2.get(k1) {
                    Some(v2) => match_values_impl(v1, v2)?,
                    None => bail!("missing key `{k1}`{}", display_values(computed, expected)?),
                }
            }
            Ok(())
        }

        // Dates, timespans and applications are written in yaml as their serialized form.
        (Value::Date(_) | Value::Timespan(_) | Value::Application(_), _)
            if serde_json::to_string(computed)? == serde_json::to_string(expected)? =>
        {
            Ok(())
        }

        (c, e) if c == e => Ok(()),

        _ => bail!("value mismatch: {}", display_values(computed, expected)?),
    }
}

fn match_values(computed: &Value, expected: &Value) -> Result<()> {
    match match_values_impl(computed, expected) {
        Ok(()) => Ok(()),
        Err(e) => bail!("\nmismatch in {}{}", display_values(computed, expected)?, e),
    }
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    data: Option<Value>,
    parameters: Option<Value>,
    special: Option<Value>,
    sources: Option<Value>,
    expr: Option<String>,
    template: Option<String>,
    want_result: Option<Value>,
    error: Option<String>,
    skip: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn root_for(case: &TestCase) -> Result<RootContext> {
    let special = match &case.special {
        Some(v) => Some(v.as_object()?.clone()),
        None => None,
    };
    let root = RootContext::new(
        case.data.clone().unwrap_or_else(Value::new_object),
        RootOptions {
            parameters: case.parameters.clone(),
            special,
            ..Default::default()
        },
    );
    if let Some(sources) = &case.sources {
        for (name, v) in sources.as_object()?.iter() {
            let source = DataSet::from_value(v).unwrap_or_else(|| DataSet::new(v.clone()));
            root.add_source(name, source);
        }
    }
    Ok(root)
}

fn eval_case(case: &TestCase) -> Result<Value> {
    let root = root_for(case)?;
    match (&case.expr, &case.template) {
        (Some(expr), None) => evaluate(&root, expr.as_str()),
        (None, Some(text)) => template(&root, text),
        _ => bail!("exactly one of expr or template must be specified"),
    }
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    println!("running {file}");

    for case in test.cases {
        print!("case {} ", case.note);
        if case.skip == Some(true) {
            println!("skipped");
            continue;
        }

        match (&case.want_result, &case.error) {
            (Some(_), None) | (None, Some(_)) => (),
            _ => panic!("either want_result or error must be specified in test case."),
        }

        match eval_case(&case) {
            Ok(result) => match &case.want_result {
                Some(want) => match_values(&result, &process_value(want))?,
                None => bail!("eval succeeded and did not produce any errors"),
            },
            Err(actual) => match &case.error {
                Some(expected) => {
                    let actual = actual.to_string();
                    if !actual.contains(expected) {
                        bail!(
                            "Error message\n`{}\n`\ndoes not contain `{}`",
                            actual,
                            expected
                        );
                    }
                    println!("{actual}");
                }
                _ => return Err(actual),
            },
        }

        println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test]
#[ignore = "intended for running a single yaml file given on the command line"]
fn one_yaml() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let file = env::args().find(|a| a.ends_with(".yaml"));
    match file {
        Some(file) => yaml_test(&file),
        None => bail!("missing <yaml-file>"),
    }
}

#[test_resources("tests/interpreter/cases/**/*.yaml")]
fn run(path: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    yaml_test(path).unwrap()
}
