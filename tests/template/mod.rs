// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use relish::*;

#[test]
fn blocks_desugar_to_operations() -> Result<()> {
    let e = parse_template("{{#if x}}a{{else}}b{{/if}}")?;
    assert_eq!(stringify(&e), "(if x 'a' 'b')");

    let e = parse_template("{{#each xs}}{{_}}{{/each}}")?;
    assert_eq!(stringify(&e), "(each xs =>(cat _))");

    let e = parse_template("n = {{n + 1}}!")?;
    assert_eq!(stringify(&e), "(cat 'n = ' (+ n 1) '!')");

    assert_eq!(parse_template("plain \\{{text}}")?, Expr::literal("plain {{text}}"));
    Ok(())
}

#[test]
fn templates_cache_separately() -> Result<()> {
    let root = RootContext::from_value(Value::from_json_str(r#"{"who": "world"}"#)?);
    let text = "hello {{who}}";
    assert_eq!(template(&root, text)?, Value::from("hello world"));
    assert_eq!(template(&root, text)?, Value::from("hello world"));
    assert_eq!(root.cached_count("template"), 1);
    assert_eq!(root.cached_count("default"), 0);

    // The same text as an expression is a different entry.
    assert!(evaluate(&root, text).is_err());
    assert_eq!(root.cached_count("default"), 1);
    Ok(())
}

#[test]
fn template_parser_on_a_root() -> Result<()> {
    let root = RootContext::new(
        Value::from_json_str(r#"{"xs": [1, 2]}"#)?,
        RootOptions {
            parser: Some(std::rc::Rc::new(TemplateParser)),
            ..Default::default()
        },
    );
    assert_eq!(
        evaluate(&root, "{{#each xs}}[{{_}}]{{/each}}")?,
        Value::from("[1][2]")
    );
    assert_eq!(root.cached_count("template"), 1);
    Ok(())
}

#[test]
fn errors_point_at_the_tag() {
    let e = match parse_template("ok\n{{#if x}}never closed") {
        Err(e) => e,
        Ok(e) => panic!("parsed {e:?}"),
    };
    assert_eq!(e.message, "unclosed `if` block");
    assert_eq!((e.line, e.column), (2, 1));

    let e = match parse_template("{{#each xs}}{{/with}}") {
        Err(e) => e,
        Ok(e) => panic!("parsed {e:?}"),
    };
    assert!(e.message.contains("does not close `each`"));
}
