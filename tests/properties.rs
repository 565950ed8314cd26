//! Property tests for the invariants that must hold regardless of which grammar is
//! being run: consumed-byte accounting, token-order, lookahead transparency, and the
//! identities `wrap`/`ignore`/`optional` are defined by.

use gram::prelude::*;
use proptest::prelude::*;

fn ascii_letters() -> Program {
    Program::new().repeat(Program::new().ascii_char(b'a'..=b'z').unwrap(), None, gram::GenTimes::Default).unwrap()
}

proptest! {
    #[test]
    fn consumed_bytes_match_offset_and_length_delta(input in "[a-z]{0,20}") {
        let parser = Parser::compile(&ascii_letters(), CompileOptions::default()).unwrap();
        let success = parser.parse(input.as_bytes(), ParseOptions::default()).unwrap();
        let consumed = input.len() - success.rest.len();
        prop_assert_eq!(consumed, success.position.byte_offset);
        prop_assert_eq!(consumed, success.consumed);
    }

    #[test]
    fn wrap_yields_one_token_equal_to_the_inner_token_list(input in "[a-z]{0,20}") {
        let inner = ascii_letters();
        let wrapped = Program::new().wrap(ascii_letters()).unwrap();

        let inner_parser = Parser::compile(&inner, CompileOptions::default()).unwrap();
        let wrapped_parser = Parser::compile(&wrapped, CompileOptions::default()).unwrap();

        let inner_success = inner_parser.parse(input.as_bytes(), ParseOptions::default()).unwrap();
        let wrapped_success = wrapped_parser.parse(input.as_bytes(), ParseOptions::default()).unwrap();

        prop_assert_eq!(wrapped_success.tokens.len(), 1);
        match &wrapped_success.tokens[0] {
            Value::List(items) => prop_assert_eq!(items, &inner_success.tokens),
            other => prop_assert!(false, "expected a list token, got {:?}", other),
        }
    }

    #[test]
    fn ignore_yields_no_tokens_whenever_the_body_succeeds(input in "[a-z]{0,20}") {
        let ignored = Program::new().ignore(ascii_letters()).unwrap();
        let parser = Parser::compile(&ignored, CompileOptions::default()).unwrap();
        let success = parser.parse(input.as_bytes(), ParseOptions::default()).unwrap();
        prop_assert!(success.tokens.is_empty());
    }

    #[test]
    fn optional_on_a_failing_body_consumes_nothing_and_emits_nothing(input in "[0-9]{0,10}") {
        let optional = Program::new().optional(Program::new().string("never-matches").unwrap()).unwrap();
        let parser = Parser::compile(&optional, CompileOptions::default()).unwrap();
        let success = parser.parse(input.as_bytes(), ParseOptions::default()).unwrap();
        prop_assert!(success.tokens.is_empty());
        prop_assert_eq!(success.rest, input.as_bytes());
        prop_assert_eq!(success.position.byte_offset, 0);
    }

    #[test]
    fn positive_lookahead_never_changes_acc_ctx_or_position(input in "[a-z]{1,20}") {
        let peeked = Program::new()
            .lookahead(ascii_letters(), gram::Sense::Positive)
            .unwrap();
        let parser = Parser::compile(&peeked, CompileOptions::default()).unwrap();
        let success = parser.parse(input.as_bytes(), ParseOptions::default()).unwrap();
        prop_assert!(success.tokens.is_empty());
        prop_assert_eq!(success.rest, input.as_bytes());
        prop_assert_eq!(success.position.byte_offset, 0);
    }

    #[test]
    fn duplicate_matches_the_same_body_repeated_in_sequence(input in "[a-z]{3,3}") {
        let via_duplicate = Program::new().duplicate(Program::new().ascii_char(b'a'..=b'z').unwrap(), 3).unwrap();
        let via_then = Program::new()
            .ascii_char(b'a'..=b'z')
            .unwrap()
            .ascii_char(b'a'..=b'z')
            .unwrap()
            .ascii_char(b'a'..=b'z')
            .unwrap();

        let a = Parser::compile(&via_duplicate, CompileOptions::default()).unwrap();
        let b = Parser::compile(&via_then, CompileOptions::default()).unwrap();

        let success_a = a.parse(input.as_bytes(), ParseOptions::default()).unwrap();
        let success_b = b.parse(input.as_bytes(), ParseOptions::default()).unwrap();
        prop_assert_eq!(success_a.tokens, success_b.tokens);
        prop_assert_eq!(success_a.rest, success_b.rest);
    }

    #[test]
    fn generated_input_always_reparses(seed in any::<u64>()) {
        use rand::SeedableRng;

        let digit = Program::new().ascii_char(b'0'..=b'9').unwrap();
        let letter = Program::new().ascii_char(b'a'..=b'z').unwrap();
        let one = Program::new().choice(vec![digit, letter], Some(vec![1, 3])).unwrap();
        let program = Program::new().repeat(one, None, gram::GenTimes::Range(0, 10)).unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let bytes = gram::generate(&program, &mut rng, &()).unwrap();

        let parser = Parser::compile(&program, CompileOptions::default()).unwrap();
        let result = parser.parse(&bytes, ParseOptions::default());
        prop_assert!(result.is_ok());
    }
}
