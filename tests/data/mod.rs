// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use relish::*;

fn people() -> Result<Value> {
    Value::from_json_str(
        r#"[
            {"name": "bo", "team": "red", "role": "dev", "age": 2},
            {"name": "al", "team": "blue", "role": "ops", "age": 2},
            {"name": "cy", "team": "red", "role": "ops", "age": 5},
            {"name": "di", "team": "red", "role": "dev", "age": 1}
        ]"#,
    )
}

fn names(rows: &[Value]) -> Vec<String> {
    rows.iter().map(|r| r["name"].to_text()).collect()
}

#[test]
fn multi_key_sort() -> Result<()> {
    let root = RootContext::from_value(Value::Null);
    let rows = people()?;
    let sorted = sort(&root, rows.as_array()?, &Value::from_json_str(r#"["-age", "name"]"#)?)?;
    assert_eq!(names(&sorted), ["cy", "al", "bo", "di"]);

    let by_object = sort(
        &root,
        rows.as_array()?,
        &Value::from_json_str(r#"{"by": "name", "dir": "desc"}"#)?,
    )?;
    assert_eq!(names(&by_object), ["di", "cy", "bo", "al"]);

    // Without keys the rows themselves are compared.
    let plain = Value::from_json_str("[3, 1, 2]")?;
    assert_eq!(
        sort(&root, plain.as_array()?, &Value::Null)?,
        vec![Value::from(1), Value::from(2), Value::from(3)]
    );
    Ok(())
}

#[test]
fn groups_keep_first_seen_order() -> Result<()> {
    let root = RootContext::from_value(Value::Null);
    let rows = people()?;
    let groups = group(&root, rows.as_array()?, &Value::from("team"))?;
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].group, Value::from("red"));
    assert_eq!(names(&groups[0].all), ["bo", "cy", "di"]);
    assert_eq!(groups[1].level, 0);

    for g in &groups {
        assert_eq!(Group::from_value(&g.to_value()).as_ref(), Some(g));
    }

    let nested = group(&root, rows.as_array()?, &Value::from_json_str(r#"["team", "role"]"#)?)?;
    let red = &nested[0];
    assert_eq!(red.all.len(), 3);
    let Some(red_dev) = Group::from_value(&red.value[0]) else {
        panic!("expected a sub-group");
    };
    assert_eq!(red_dev.level, 1);
    assert_eq!(red_dev.group, Value::from("dev"));
    assert_eq!(names(&red_dev.value), ["bo", "di"]);
    Ok(())
}

#[test]
fn filter_keeps_schema() -> Result<()> {
    let root = RootContext::from_value(Value::Null);
    let schema = Value::from_json_str(r#"{"fields": [{"name": "name"}]}"#)?;
    let source = DataSet::with_schema(people()?, schema.clone()).to_value();

    let Expr::Application(predicate) = parse("=> age >= 2")? else {
        panic!("expected an application");
    };
    let out = filter(
        &root,
        &source,
        &FilterOptions {
            predicate: Some(predicate),
            sort: Some(Value::from("name")),
            group: None,
        },
    )?;
    assert_eq!(out.schema, Some(schema));
    assert_eq!(names(out.value.as_array()?), ["al", "bo", "cy"]);

    let grouped = filter(
        &root,
        &people()?,
        &FilterOptions {
            group: Some(Value::from("team")),
            ..Default::default()
        },
    )?;
    assert_eq!(grouped.schema, None);
    assert_eq!(grouped.value.as_array()?.len(), 2);
    Ok(())
}

#[test]
fn data_set_shapes() -> Result<()> {
    let plain = Value::from_json_str(r#"{"value": [1]}"#)?;
    assert_eq!(DataSet::from_value(&plain), Some(DataSet::new(Value::from(vec![Value::from(1)]))));

    let extra = Value::from_json_str(r#"{"value": [1], "other": 2}"#)?;
    assert_eq!(DataSet::from_value(&extra), None);
    assert_eq!(DataSet::from_value(&Value::from(1)), None);

    assert!(matches!(
        Extractor::from_value(&Value::from("a.b")),
        Some(Extractor::Path(_))
    ));
    assert_eq!(Extractor::from_value(&Value::from(1)), None);
    Ok(())
}

fn mixed() -> Result<Vec<Value>> {
    let mut items = vec![
        Value::Null,
        Value::Undefined,
        Value::from(3),
        Value::from(-1),
        Value::from(2.5),
        Value::from(f64::NAN),
        Value::from(f64::INFINITY),
        Value::from(f64::NEG_INFINITY),
        Value::from("10"),
        Value::from("9"),
        Value::from(" 4 "),
        Value::from("88a"),
        Value::from("b"),
        Value::from(""),
        Value::from("NaN"),
        Value::Bool(true),
        Value::Bool(false),
        Value::from(Timespan::new(0, 5)),
        Value::from(Timespan::new(1, 0)),
        evaluate(Value::Null, "#2024-01-31#")?,
    ];
    for json in [r#"[1]"#, r#"[1, "x"]"#, r#"[]"#, r#"{"k": 1}"#, r#"{"k": "a"}"#] {
        items.push(Value::from_json_str(json)?);
    }
    Ok(items)
}

/// Fisher-Yates driven by a fixed linear congruential sequence.
fn shuffled(items: &[Value], seed: u64) -> Vec<Value> {
    let mut out = items.to_vec();
    let mut state = seed;
    for i in (1..out.len()).rev() {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        out.swap(i, (state >> 33) as usize % (i + 1));
    }
    out
}

#[test]
fn loose_order_is_total() -> Result<()> {
    let items = mixed()?;
    for a in &items {
        assert_eq!(a.loose_cmp(a), std::cmp::Ordering::Equal, "{a:?}");
        for b in &items {
            assert_eq!(a.loose_cmp(b), b.loose_cmp(a).reverse(), "{a:?} vs {b:?}");
            for c in &items {
                if a.loose_cmp(b).is_le() && b.loose_cmp(c).is_le() {
                    assert!(a.loose_cmp(c).is_le(), "{a:?} <= {b:?} <= {c:?}");
                }
            }
        }
    }
    Ok(())
}

#[test]
fn mixed_values_sort_without_panicking() -> Result<()> {
    let root = RootContext::from_value(Value::Null);
    let items = mixed()?;
    let many: Vec<Value> = (0..8).flat_map(|_| items.iter().cloned()).collect();
    for seed in 0..16 {
        let sorted = sort(&root, &shuffled(&many, seed), &Value::Null)?;
        assert_eq!(sorted.len(), many.len());
        for pair in sorted.windows(2) {
            assert!(pair[0].loose_cmp(&pair[1]).is_le(), "{:?} before {:?}", pair[0], pair[1]);
        }
        assert!(sorted[..16].iter().all(Value::is_nullish));
    }

    let sorted = evaluate(Value::Null, "sort(['b', NaN, 3, null, '1', -Infinity])")?;
    let texts: Vec<String> = sorted.as_array()?.iter().map(Value::to_text).collect();
    assert_eq!(texts, ["", "-Infinity", "1", "3", "NaN", "b"]);
    Ok(())
}
