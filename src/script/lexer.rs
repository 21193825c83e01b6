//! Tokenizer for the Sparkle script surface: a metacommand header followed
//! by literals and operation words, with `#` comments and an optional `|;`
//! end-of-script marker.

pub(crate) const MAX_STRING_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// `%key;` or `%key arg;`
    Meta { key: String, arg: Option<String> },
    Int(i32),
    Float(f64),
    Str(String),
    /// An operation name.
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct LexError {
    pub line: u64,
    pub message: String,
}

pub(crate) fn lex(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer {
        src: input,
        bytes: input.as_bytes(),
        i: 0,
        line: 1,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    i: usize,
    line: u64,
}

impl Lexer<'_> {
    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        while self.i < self.bytes.len() {
            let c = self.bytes[self.i];
            match c {
                b'\n' => {
                    self.line += 1;
                    self.i += 1;
                }
                _ if c.is_ascii_whitespace() => self.i += 1,
                b'#' => self.skip_comment(),
                b'%' => {
                    self.i += 1;
                    let line = self.line;
                    let kind = self.lex_meta()?;
                    out.push(Token { kind, line });
                }
                b'"' => {
                    self.i += 1;
                    let line = self.line;
                    let s = self.lex_string()?;
                    out.push(Token {
                        kind: TokenKind::Str(s),
                        line,
                    });
                }
                b'|' if self.bytes.get(self.i + 1) == Some(&b';') => {
                    self.i += 2;
                    self.check_trailing()?;
                    break;
                }
                _ => {
                    let line = self.line;
                    let word = self.bare_token();
                    let kind = classify(word, line)?;
                    out.push(Token { kind, line });
                }
            }
        }
        Ok(out)
    }

    fn err(&self, message: impl Into<String>) -> LexError {
        LexError {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_comment(&mut self) {
        while self.i < self.bytes.len() && self.bytes[self.i] != b'\n' {
            self.i += 1;
        }
    }

    fn skip_meta_space(&mut self) {
        while self.i < self.bytes.len() {
            match self.bytes[self.i] {
                b'\n' => {
                    self.line += 1;
                    self.i += 1;
                }
                c if c.is_ascii_whitespace() => self.i += 1,
                _ => break,
            }
        }
    }

    fn meta_word(&mut self) -> &str {
        let start = self.i;
        while self.i < self.bytes.len() {
            let c = self.bytes[self.i];
            if c.is_ascii_whitespace() || c == b';' {
                break;
            }
            self.i += 1;
        }
        &self.src[start..self.i]
    }

    fn lex_meta(&mut self) -> Result<TokenKind, LexError> {
        self.skip_meta_space();
        let key = self.meta_word().to_owned();
        if key.is_empty() {
            return Err(self.err("Header syntax error"));
        }
        self.skip_meta_space();
        if self.bytes.get(self.i) == Some(&b';') {
            self.i += 1;
            return Ok(TokenKind::Meta { key, arg: None });
        }
        let arg = self.meta_word().to_owned();
        self.skip_meta_space();
        if self.bytes.get(self.i) != Some(&b';') {
            return Err(self.err("Header syntax error"));
        }
        self.i += 1;
        Ok(TokenKind::Meta {
            key,
            arg: Some(arg),
        })
    }

    fn lex_string(&mut self) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            let Some(&c) = self.bytes.get(self.i) else {
                return Err(self.err("Unterminated string"));
            };
            match c {
                b'"' => {
                    self.i += 1;
                    return Ok(s);
                }
                b'\\' => match self.bytes.get(self.i + 1).copied() {
                    Some(e @ (b'\\' | b'"')) => {
                        s.push(e as char);
                        self.i += 2;
                    }
                    _ => return Err(self.err("String contains bad escape code")),
                },
                0x20..=0x7e => {
                    s.push(c as char);
                    self.i += 1;
                }
                _ => return Err(self.err("String contains illegal characters")),
            }
            if s.len() > MAX_STRING_LEN {
                return Err(self.err("String is too long"));
            }
        }
    }

    fn bare_token(&mut self) -> &str {
        let start = self.i;
        while self.i < self.bytes.len() {
            let c = self.bytes[self.i];
            if c.is_ascii_whitespace() || c == b'"' || c == b'#' {
                break;
            }
            self.i += 1;
        }
        &self.src[start..self.i]
    }

    /// Only blank content and comments may follow the `|;` marker.
    fn check_trailing(&mut self) -> Result<(), LexError> {
        while self.i < self.bytes.len() {
            match self.bytes[self.i] {
                b'\n' => {
                    self.line += 1;
                    self.i += 1;
                }
                b'#' => self.skip_comment(),
                c if c.is_ascii_whitespace() => self.i += 1,
                _ => return Err(self.err("Content after end-of-script marker")),
            }
        }
        Ok(())
    }
}

fn classify(word: &str, line: u64) -> Result<TokenKind, LexError> {
    let err = |message: String| LexError { line, message };
    let first = word.as_bytes()[0];
    if first == b'+' || first == b'-' || first.is_ascii_digit() {
        if word.contains(['.', 'e', 'E']) {
            let v: f64 = word
                .parse()
                .map_err(|_| err(format!("Failed to parse as float: {word}")))?;
            if !v.is_finite() {
                return Err(err(format!("Float is not finite: {word}")));
            }
            Ok(TokenKind::Float(v))
        } else {
            let v: i32 = word
                .parse()
                .map_err(|_| err(format!("Failed to parse as integer: {word}")))?;
            Ok(TokenKind::Int(v))
        }
    } else if first.is_ascii_alphabetic()
        && word.bytes().all(|c| c.is_ascii_alphanumeric() || c == b'_')
    {
        Ok(TokenKind::Word(word.to_owned()))
    } else {
        Err(err(format!("Unrecognized token: {word}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        lex(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_header_and_body() {
        let toks = kinds("%sparkle;\n%bufcount 2;\n0 4 1 3 reset\n");
        assert_eq!(
            toks[0],
            TokenKind::Meta {
                key: "sparkle".into(),
                arg: None
            }
        );
        assert_eq!(
            toks[1],
            TokenKind::Meta {
                key: "bufcount".into(),
                arg: Some("2".into())
            }
        );
        assert_eq!(toks[2], TokenKind::Int(0));
        assert_eq!(toks[6], TokenKind::Word("reset".into()));
    }

    #[test]
    fn classifies_numeric_literals() {
        assert_eq!(kinds("-12"), vec![TokenKind::Int(-12)]);
        assert_eq!(kinds("+7"), vec![TokenKind::Int(7)]);
        assert_eq!(kinds("1.5"), vec![TokenKind::Float(1.5)]);
        assert_eq!(kinds("2e3"), vec![TokenKind::Float(2000.0)]);
        assert!(lex("12345678901").is_err());
        assert!(lex("1e999").is_err());
        assert!(lex("3x").is_err());
    }

    #[test]
    fn string_escapes_and_limits() {
        assert_eq!(
            kinds(r#""a\"b\\c""#),
            vec![TokenKind::Str(r#"a"b\c"#.into())]
        );
        assert!(lex("\"bad\\n\"").is_err());
        assert!(lex("\"unterminated").is_err());
        let long = format!("\"{}\"", "x".repeat(256));
        assert!(lex(&long).is_err());
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(kinds("# all comment\n42 # trailing\n"), vec![TokenKind::Int(42)]);
    }

    #[test]
    fn end_marker_stops_lexing() {
        assert_eq!(kinds("1 |;\n# done\n"), vec![TokenKind::Int(1)]);
        assert!(lex("1 |; 2").is_err());
    }

    #[test]
    fn tracks_line_numbers() {
        let toks = lex("%sparkle;\n\n5\nprint\n").unwrap();
        assert_eq!(toks[1].line, 3);
        assert_eq!(toks[2].line, 4);
    }
}
