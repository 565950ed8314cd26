//! A `key=value` line grammar, registered under a name and exercised both ways:
//! parsed from bytes, and random instances generated and fed back through the parser.

use gram::prelude::*;
use gram::RangeSpec;

fn line() -> Program {
    let key = Program::new()
        .ascii_string_range(vec![RangeSpec::from_bytes(b'a'..=b'z').unwrap()], 1, 16)
        .unwrap();
    let value = Program::new()
        .ascii_string_range(
            vec![
                RangeSpec::from_bytes(b'a'..=b'z').unwrap(),
                RangeSpec::from_bytes(b'0'..=b'9').unwrap(),
            ],
            0,
            32,
        )
        .unwrap();
    Program::new()
        .then(key)
        .unwrap()
        .then(Program::new().ignore(Program::new().string("=").unwrap()).unwrap())
        .unwrap()
        .then(value)
        .unwrap()
        .eos()
        .unwrap()
}

fn main() {
    let grammar = Grammar::new().define("line", line(), Visibility::Public);
    let compiled = grammar.compile(CompileOptions::default()).expect("grammar compiles");

    let success = compiled
        .parse("line", b"timeout=30", ParseOptions::default())
        .expect("input matches");
    println!("parsed: {:?}", success.tokens);

    let mut rng = rand::thread_rng();
    for _ in 0..3 {
        let sample = gram::generate(&line(), &mut rng, &()).expect("generation succeeds");
        let reparsed = compiled
            .parse("line", &sample, ParseOptions::default())
            .expect("generated input reparses");
        println!("generated {:?} -> {:?}", String::from_utf8_lossy(&sample), reparsed.tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_generation() {
        let mut rng = rand::rngs::mock::StepRng::new(7, 11);
        let grammar = Grammar::new().define("line", line(), Visibility::Public);
        let compiled = grammar.compile(CompileOptions::default()).unwrap();
        let sample = gram::generate(&line(), &mut rng, &()).unwrap();
        assert!(compiled.parse("line", &sample, ParseOptions::default()).is_ok());
    }

    #[test]
    fn rejects_a_line_missing_the_separator() {
        let grammar = Grammar::new().define("line", line(), Visibility::Public);
        let compiled = grammar.compile(CompileOptions::default()).unwrap();
        assert!(compiled.parse("line", b"timeout30", ParseOptions::default()).is_err());
    }
}
