// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use relish::*;

use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn call_forms_agree() -> Result<()> {
    assert_eq!(parse("(+ foo.1 (- 69 29))")?, parse("foo.1 + (69 - 29)")?);
    assert_eq!(parse("sum(a, b)")?, parse("(sum a b)")?);
    assert_eq!(stringify(&parse("(+ foo.1 (- 69 29))")?), "(+ foo.1 (- 69 29))");
    Ok(())
}

#[test]
fn operators_fold_left_by_precedence() -> Result<()> {
    let e = parse("a or b and c == 1 + 2 * 3 - 4")?;
    assert_eq!(stringify(&e), "(and (or a b) (== c (- (+ 1 (* 2 3)) 4)))");
    Ok(())
}

#[test]
fn programs_and_bindings() -> Result<()> {
    let e = parse("let i = 10; i + i * i")?;
    assert_eq!(stringify(&e), "(block (let 'i' 10) (+ i (* i i)))");
    assert_eq!(stringify(&parse("set ~a.b = 1")?), "(set '~a.b' 1)");
    // `let` without `=` is an ordinary reference.
    assert_eq!(stringify(&parse("let")?), "let");
    Ok(())
}

#[test]
fn literals_fold() -> Result<()> {
    assert_eq!(
        parse("[1, 'a', {b: [true, null]}]")?,
        Expr::literal(Value::from_json_str(r#"[1, "a", {"b": [true, null]}]"#)?)
    );
    assert_eq!(parse("-(2)")?, Expr::literal(-2.0));
    assert!(matches!(parse("[1, x]")?, Expr::Operation(_)));
    Ok(())
}

#[test]
fn literal_round_trip() -> Result<()> {
    for src in [
        "42",
        "-3.5",
        "'it\\'s'",
        "'a\\${b}'",
        "true",
        "null",
        "undefined",
        "[]",
        "{}",
        "[1, 'a', [true, null]]",
        "{a: 1, 'b c': 'x', '1': [2]}",
        "#2024-01-31#",
        "#2024-01-31T10:15:00+02:00#",
        "#1y 2mo 3d 4h 5m 6s 7ms#",
        "Infinity",
        "-Infinity",
        "[1, -Infinity]",
    ] {
        let e = parse(src)?;
        let printed = stringify(&e);
        assert_eq!(parse(&printed)?, e, "{src} printed as {printed}");
    }

    for n in [f64::INFINITY, f64::NEG_INFINITY] {
        let e = Expr::literal(n);
        assert_eq!(parse(&stringify(&e))?, e);
        let call = Expr::operation("+", vec![Expr::literal(1.0), e]);
        assert_eq!(parse(&stringify(&call))?, call);
    }
    let printed = stringify(&Expr::literal(f64::NAN));
    assert_eq!(printed, "NaN");
    assert!(matches!(parse(&printed)?, Expr::Literal(Value::Number(n)) if n.is_nan()));
    Ok(())
}

#[test]
fn non_finite_names_evaluate_as_numbers() -> Result<()> {
    assert_eq!(evaluate(Value::Null, "Infinity > 1e300")?, Value::Bool(true));
    assert_eq!(evaluate(Value::Null, "-Infinity")?, Value::from(f64::NEG_INFINITY));
    // Only the exact names are keywords.
    let data = Value::from_json_str(r#"{"Infinityx": 1}"#)?;
    assert_eq!(evaluate(data, "Infinityx")?, Value::from(1));
    Ok(())
}

#[test]
fn interpolation() -> Result<()> {
    let e = parse("`a ${b + 1} c`")?;
    assert_eq!(stringify(&e), "(cat 'a ' (+ b 1) ' c')");
    assert_eq!(parse("'${x}'")?, Expr::operation("cat", vec![parse("x")?]));
    Ok(())
}

#[test]
fn applications() -> Result<()> {
    let Expr::Application(app) = parse("|a, b| => a + b")? else {
        panic!("expected an application");
    };
    let names: Vec<Rc<str>> = vec!["a".into(), "b".into()];
    assert_eq!(app.names.as_ref(), Some(&names));
    assert_eq!(stringify(&parse("=> _ * 2")?), "=>(* _ 2)");
    Ok(())
}

#[test]
fn paths() -> Result<()> {
    let path = parse_path("^^!a.b[0]['c d']")?;
    assert_eq!(path.up, 2);
    assert_eq!(path.prefix, Some(Prefix::Parameters));
    assert_eq!(
        path.keys,
        vec![
            Key::Name("a".into()),
            Key::Name("b".into()),
            Key::Index(0),
            Key::Name("c d".into()),
        ]
    );

    let path = parse_path("x[y.z]")?;
    assert!(matches!(path.keys[1], Key::Expr(Expr::Reference(_))));
    assert!(parse_path("a b").is_err());
    Ok(())
}

#[test]
fn postfix_sugar() -> Result<()> {
    assert_eq!(stringify(&parse("(f x).0.name")?), "(get (get (f x) 0) 'name')");
    assert_eq!(stringify(&parse("total#number,0")?), "(format total 'number' 0)");
    Ok(())
}

#[test]
fn if_expressions() -> Result<()> {
    let e = parse("if a then 1 else if b then 2 else 3 end")?;
    assert_eq!(stringify(&e), "(if a 1 b 2 3)");
    assert_eq!(stringify(&parse("if a then 1 elif b then 2")?), "(if a 1 b 2)");
    Ok(())
}

#[test]
fn dates_and_timespans() -> Result<()> {
    assert!(matches!(parse("#2024-01-31#")?, Expr::Literal(Value::Date(_))));
    assert_eq!(
        parse("#1 day 2h#")?,
        Expr::literal(Timespan::new(0, 26 * 3_600_000))
    );
    assert_eq!(stringify(&parse("#today#")?), "(date 'today')");
    Ok(())
}

#[test]
fn errors_carry_positions() {
    let e = match parse("1 +\n2 +") {
        Err(e) => e,
        Ok(e) => panic!("parsed {e:?}"),
    };
    assert_eq!(e.message, "unexpected end of input");
    assert_eq!((e.line, e.column), (2, 4));
    assert!(e.to_string().contains("<expr>:2:4"));

    let e = match parse("(+ 1") {
        Err(e) => e,
        Ok(e) => panic!("parsed {e:?}"),
    };
    assert_eq!(e.message, "expected `)`");
    assert_eq!(e.offset, 4);
}

#[test]
fn consume_all() -> Result<()> {
    assert!(parse("1 2").is_err());
    let partial = parse_with("1 2", &ParseOptions { consume_all: false })?;
    assert_eq!(partial, Expr::literal(1.0));
    Ok(())
}

#[test]
fn nested_calls_parse_in_linear_time() -> Result<()> {
    let depth = 30;
    let src = format!("{}x{}", "(f ".repeat(depth), ")".repeat(depth));
    let start = Instant::now();
    let e = parse(&src)?;
    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    assert_eq!(stringify(&e), src);

    // The first argument of a unary-looking call is itself parenthesized.
    let src = (1..depth).fold("(- 1 1)".to_string(), |inner, _| format!("(- {inner} 1)"));
    let start = Instant::now();
    let e = parse(&src)?;
    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    assert_eq!(stringify(&e), src);
    assert_eq!(evaluate(Value::Null, src.as_str())?, Value::from(1 - depth as i32));
    Ok(())
}

#[test]
fn deep_nesting_is_an_error() -> Result<()> {
    for src in [
        "[".repeat(100_000),
        "(".repeat(100_000),
        "{a: ".repeat(100_000),
        format!("{}1", "-".repeat(100_000)),
        format!("{}x", "(f ".repeat(100_000)),
    ] {
        let e = match parse(&src) {
            Err(e) => e,
            Ok(e) => panic!("parsed {:?}", stringify(&e)),
        };
        assert_eq!(e.message, "expression nested too deeply");
    }

    let e = match parse_template(&"{{#if x}}".repeat(10_000)) {
        Err(e) => e,
        Ok(e) => panic!("parsed {:?}", stringify(&e)),
    };
    assert_eq!(e.message, "expression nested too deeply");

    // Moderate nesting is fine.
    let src = format!("{}1{}", "[".repeat(50), "]".repeat(50));
    assert!(parse(&src).is_ok());
    Ok(())
}
