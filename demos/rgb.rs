//! Parses `#rrggbb` hex colors, built from the byte-range and traverse primitives.

use gram::prelude::*;
use gram::RangeSpec;

fn hex_pair() -> Program {
    let op: gram::runtime::TraverseOp = std::rc::Rc::new(|_rest, tokens, ctx, _pos| {
        let mut forward = tokens;
        forward.reverse();
        let mut value = 0i64;
        for t in forward {
            match t {
                Value::Int(n) => {
                    let digit = match n as u8 {
                        b @ b'0'..=b'9' => i64::from(b - b'0'),
                        b @ b'a'..=b'f' => i64::from(b - b'a' + 10),
                        b @ b'A'..=b'F' => i64::from(b - b'A' + 10),
                        _ => return Err("expected a hex digit".to_string()),
                    };
                    value = value * 16 + digit;
                }
                _ => return Err("expected a hex digit".to_string()),
            }
        }
        Ok((vec![Value::Int(value)], ctx))
    });
    let digit = Program::new()
        .bin_segment(
            vec![
                RangeSpec::from_bytes(b'0'..=b'9').unwrap(),
                RangeSpec::from_bytes(b'a'..=b'f').unwrap(),
                RangeSpec::from_bytes(b'A'..=b'F').unwrap(),
            ],
            vec![],
            gram::Modifier::Integer,
        )
        .unwrap();
    Program::new()
        .traverse_post(digit.clone().then(digit).unwrap(), vec![op])
        .unwrap()
}

fn rgb() -> Program {
    Program::new()
        .ignore(Program::new().string("#").unwrap())
        .unwrap()
        .then(hex_pair())
        .unwrap()
        .then(hex_pair())
        .unwrap()
        .then(hex_pair())
        .unwrap()
        .eos()
        .unwrap()
}

fn main() {
    let parser = Parser::compile(&rgb(), CompileOptions::default()).expect("grammar compiles");
    let success = parser
        .parse(b"#1a2b3c", ParseOptions::default())
        .expect("input matches");
    println!("{:?}", success.tokens);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_channel_independently() {
        let parser = Parser::compile(&rgb(), CompileOptions::default()).unwrap();
        let success = parser.parse(b"#102030", ParseOptions::default()).unwrap();
        assert_eq!(success.tokens, vec![Value::Int(0x10), Value::Int(0x20), Value::Int(0x30)]);
    }

    #[test]
    fn rejects_a_non_hex_channel() {
        let parser = Parser::compile(&rgb(), CompileOptions::default()).unwrap();
        assert!(parser.parse(b"#zz2030", ParseOptions::default()).is_err());
    }
}
