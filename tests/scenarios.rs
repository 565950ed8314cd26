//! The concrete worked scenarios: one test per example, checked against the exact
//! tokens/rest/offset/reason the grammar should produce.

use gram::prelude::*;
use gram::{GenTimes, RangeSpec, Sense};
use std::rc::Rc;

fn parser(program: &Program) -> Parser {
    Parser::compile(program, CompileOptions::default()).expect("compiles")
}

#[test]
fn literal_string_match_and_mismatch() {
    let program = Program::new().string("T").unwrap();
    let p = parser(&program);

    let ok = p.parse(b"T", ParseOptions::default()).unwrap();
    assert_eq!(ok.tokens, vec![Value::Bytes(b"T".to_vec())]);
    assert!(ok.rest.is_empty());
    assert_eq!(ok.position.byte_offset, 1);

    let err = p.parse(b"not T", ParseOptions::default()).unwrap_err();
    assert!(err.reason().contains("expected a string"));
    assert_eq!(err.position().byte_offset, 0);
}

#[test]
fn integer_of_fixed_width() {
    let program = Program::new().integer(2).unwrap();
    let p = parser(&program);

    let ok = p.parse(b"123", ParseOptions::default()).unwrap();
    assert_eq!(ok.tokens, vec![Value::Int(12)]);
    assert_eq!(ok.rest, b"3");
    assert_eq!(ok.position.byte_offset, 2);

    let err = p.parse(b"1a3", ParseOptions::default()).unwrap_err();
    assert_eq!(err.position().byte_offset, 0);
}

#[test]
fn labeled_compound_body_reports_the_label_on_mismatch() {
    let body = Program::new()
        .ascii_char(b'0'..=b'9')
        .unwrap()
        .ascii_char(b'a'..=b'z')
        .unwrap();
    let program = Program::new().label(body, "digit followed by lowercase").unwrap();
    let p = parser(&program);

    let err = p.parse(b"a1", ParseOptions::default()).unwrap_err();
    assert_eq!(err.reason(), "expected digit followed by lowercase");
    assert_eq!(err.position().byte_offset, 0);
}

#[test]
fn repeat_of_a_bound_char_class() {
    let program = Program::new()
        .repeat(Program::new().ascii_char(b'a'..=b'z').unwrap(), None, GenTimes::Default)
        .unwrap();
    let p = parser(&program);

    let matched = p.parse(b"abcd", ParseOptions::default()).unwrap();
    assert_eq!(
        matched.tokens,
        vec![Value::Int(97), Value::Int(98), Value::Int(99), Value::Int(100)]
    );
    assert!(matched.rest.is_empty());
    assert_eq!(matched.position.byte_offset, 4);

    let untouched = p.parse(b"1234", ParseOptions::default()).unwrap();
    assert!(untouched.tokens.is_empty());
    assert_eq!(untouched.rest, b"1234");
    assert_eq!(untouched.position.byte_offset, 0);
}

#[test]
fn recursive_tag_like_structure() {
    let name_ranges = vec![RangeSpec::from_bytes(b'a'..=b'z').unwrap()];
    let tag_name = || Program::new().ascii_string_range(name_ranges.clone(), 1, 16).unwrap();

    let opening = Program::new()
        .ignore(Program::new().string("<").unwrap())
        .unwrap()
        .then(tag_name())
        .unwrap()
        .then(Program::new().ignore(Program::new().string(">").unwrap()).unwrap())
        .unwrap();
    let closing = Program::new()
        .ignore(Program::new().string("</").unwrap())
        .unwrap()
        .then(tag_name())
        .unwrap()
        .then(Program::new().ignore(Program::new().string(">").unwrap()).unwrap())
        .unwrap();

    let text_chars = Program::new()
        .bin_segment(vec![], vec![RangeSpec::single(u32::from(b'<'))], gram::Modifier::Integer)
        .unwrap();
    let text_op: gram::runtime::TraverseOp = Rc::new(|_rest, tokens, ctx, _pos| {
        let mut forward = tokens;
        forward.reverse();
        let mut bytes = Vec::with_capacity(forward.len());
        for token in forward {
            match token {
                Value::Int(n) => bytes.push(n as u8),
                _ => return Err("expected a character".to_string()),
            }
        }
        Ok((vec![Value::Str(String::from_utf8_lossy(&bytes).into_owned())], ctx))
    });
    let text = Program::new()
        .traverse_post(
            Program::new().repeat(text_chars, None, GenTimes::Range(1, 64)).unwrap(),
            vec![text_op],
        )
        .unwrap();

    let body_piece = Program::new()
        .lookahead(Program::new().string("</").unwrap(), Sense::Negative)
        .unwrap()
        .choice(vec![Program::new().parsec_local("element").unwrap(), text], None)
        .unwrap();
    let body = Program::new().repeat(body_piece, None, GenTimes::Default).unwrap();

    let element = Program::new().then(opening).unwrap().then(body).unwrap().then(closing).unwrap();
    let element = Program::new().wrap(element).unwrap();

    let grammar = Grammar::new().define("element", element, Visibility::Public);
    let compiled = grammar.compile(CompileOptions::default()).unwrap();

    let result = compiled.parse("element", b"<foo>bar</foo>", ParseOptions::default()).unwrap();
    assert_eq!(
        result.tokens,
        vec![Value::List(vec![
            Value::Str("foo".to_string()),
            Value::Str("bar".to_string()),
            Value::Str("foo".to_string()),
        ])]
    );
    assert!(result.rest.is_empty());
    assert_eq!(result.position.byte_offset, 14);
}

#[test]
fn eos_after_repeated_fixed_width_strings() {
    let two_chars = Program::new().utf8_string(vec![], 2).unwrap();
    let program = Program::new()
        .repeat(two_chars, None, GenTimes::Default)
        .unwrap()
        .eos()
        .unwrap();
    let p = parser(&program);

    let ok = p.parse(b"hi", ParseOptions::default()).unwrap();
    assert_eq!(ok.tokens, vec![Value::Str("hi".to_string())]);
    assert!(ok.rest.is_empty());
    assert_eq!(ok.position.byte_offset, 2);

    let err = p.parse(b"hello", ParseOptions::default()).unwrap_err();
    assert_eq!(err.reason(), "expected end of string");
    assert_eq!(err.rest(), b"o");
    assert_eq!(err.position().byte_offset, 4);
}
