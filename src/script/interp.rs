//! Script interpreter: header parsing, literal pushes, operator dispatch.
//!
//! Failures print a one-line diagnostic to stderr carrying the module name
//! and source line, then unwind with a non-success result.

use crate::error::{SparkleError, SparkleResult};
use crate::script::lexer::{Token, TokenKind, lex};
use crate::script::ops::{OpCtx, OperatorRegistry, SamplerConfig};
use crate::script::stack::{STACK_HEIGHT, ScriptStack};
use crate::vm::{MAX_BUF_COUNT, MAX_MAT_COUNT, Vm};

struct Header {
    bufc: i32,
    matc: i32,
}

/// Run a complete script, returning the final VM state on success.
pub fn run_script(module: &str, input: &str) -> SparkleResult<Vm> {
    let tokens = match lex(input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{module}: [Line {}] {}", e.line, e.message);
            return Err(SparkleError::script(e.message));
        }
    };

    let (header, body_start) = parse_header(module, &tokens)?;
    let mut vm = Vm::new(header.bufc, header.matc);
    let registry = OperatorRegistry::with_builtins();
    let mut stack = ScriptStack::new(STACK_HEIGHT);
    let mut sampler = SamplerConfig::default();

    for tok in &tokens[body_start..] {
        let line = tok.line;
        let result = match &tok.kind {
            TokenKind::Meta { .. } => Err(SparkleError::script("Metacommand after script header")),
            TokenKind::Int(v) => stack.push_int(*v),
            TokenKind::Float(v) => stack.push_float(*v),
            TokenKind::Str(s) => stack.push_str(s.clone()),
            TokenKind::Word(name) => match registry.get(name) {
                None => Err(SparkleError::script(format!("Unknown operator: {name}"))),
                Some(op) => op(&mut OpCtx {
                    vm: &mut vm,
                    stack: &mut stack,
                    sampler: &mut sampler,
                    module,
                    line,
                }),
            },
        };
        if let Err(e) = result {
            eprintln!("{module}: [Line {line}] {}", e.message());
            return Err(e);
        }
    }

    if !stack.is_empty() {
        let msg = "Interpreter stack not empty at end of script";
        eprintln!("{module}: {msg}");
        return Err(SparkleError::script(msg));
    }
    Ok(vm)
}

fn header_err(module: &str, line: u64, msg: impl Into<String>) -> SparkleError {
    let msg = msg.into();
    eprintln!("{module}: [Line {line}] {msg}");
    SparkleError::script(msg)
}

fn parse_header(module: &str, tokens: &[Token]) -> SparkleResult<(Header, usize)> {
    let mut idx = 0;
    let mut saw_signature = false;
    let mut bufc: Option<i32> = None;
    let mut matc: Option<i32> = None;

    while idx < tokens.len() {
        let Token {
            kind: TokenKind::Meta { key, arg },
            line,
        } = &tokens[idx]
        else {
            break;
        };
        let line = *line;

        match key.as_str() {
            "sparkle" => {
                if saw_signature {
                    return Err(header_err(module, line, "Multiple %sparkle; signatures"));
                }
                if arg.is_some() {
                    return Err(header_err(module, line, "Header syntax error"));
                }
                saw_signature = true;
            }
            "bufcount" | "matcount" => {
                if !saw_signature {
                    return Err(header_err(module, line, "Failed to read %sparkle; signature"));
                }
                let arg = arg
                    .as_deref()
                    .ok_or_else(|| header_err(module, line, "Header syntax error"))?;
                let v: i32 = arg.parse().map_err(|_| {
                    header_err(module, line, format!("Failed to parse as integer: {arg}"))
                })?;
                if v < 0 {
                    return Err(header_err(module, line, "Header value may not be negative"));
                }
                let (slot, max) = if key.as_str() == "bufcount" {
                    (&mut bufc, MAX_BUF_COUNT)
                } else {
                    (&mut matc, MAX_MAT_COUNT)
                };
                if v > max {
                    return Err(header_err(
                        module,
                        line,
                        format!("Maximum value for %{key} is {max}"),
                    ));
                }
                if slot.is_some() {
                    return Err(header_err(module, line, format!("%{key} already set")));
                }
                *slot = Some(v);
            }
            other => {
                return Err(header_err(
                    module,
                    line,
                    format!("Unrecognized header token: {other}"),
                ));
            }
        }
        idx += 1;
    }

    if !saw_signature {
        let msg = "Failed to read %sparkle; signature";
        eprintln!("{module}: {msg}");
        return Err(SparkleError::script(msg));
    }
    Ok((
        Header {
            bufc: bufc.unwrap_or(0),
            matc: matc.unwrap_or(0),
        },
        idx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_defaults_to_zero_registers() {
        let vm = run_script("test", "%sparkle;\n").unwrap();
        assert_eq!(vm.bufc(), 0);
        assert_eq!(vm.matc(), 0);
    }

    #[test]
    fn header_sets_register_counts() {
        let vm = run_script("test", "%sparkle;\n%bufcount 3;\n%matcount 2;\n").unwrap();
        assert_eq!(vm.bufc(), 3);
        assert_eq!(vm.matc(), 2);
    }

    #[test]
    fn header_requires_signature_first() {
        assert!(run_script("test", "%bufcount 1;\n%sparkle;\n").is_err());
        assert!(run_script("test", "1 2\n").is_err());
        assert!(run_script("test", "").is_err());
    }

    #[test]
    fn header_rejects_duplicates_and_bad_values() {
        assert!(run_script("test", "%sparkle;\n%sparkle;\n").is_err());
        assert!(run_script("test", "%sparkle;\n%bufcount 1;\n%bufcount 1;\n").is_err());
        assert!(run_script("test", "%sparkle;\n%bufcount 4097;\n").is_err());
        assert!(run_script("test", "%sparkle;\n%bufcount -1;\n").is_err());
        assert!(run_script("test", "%sparkle;\n%bufcount x;\n").is_err());
        assert!(run_script("test", "%sparkle;\n%frobcount 1;\n").is_err());
    }

    #[test]
    fn metacommand_after_body_fails() {
        assert!(run_script("test", "%sparkle;\n\"x\" print\n%bufcount 1;\n").is_err());
    }

    #[test]
    fn unknown_operator_fails() {
        assert!(run_script("test", "%sparkle;\nbogus_op\n").is_err());
    }

    #[test]
    fn non_empty_stack_at_eof_fails() {
        assert!(run_script("test", "%sparkle;\n42\n").is_err());
    }

    #[test]
    fn print_consumes_its_argument() {
        run_script("test", "%sparkle;\n\"hello\" print\n").unwrap();
    }

    #[test]
    fn end_marker_is_accepted() {
        run_script("test", "%sparkle;\n\"x\" print\n|;\n").unwrap();
    }
}
