//! Tokenizer for the single-line assembler (spec.md §4.1).
//!
//! All "current char / current token" state lives in the `Lexer` struct
//! rather than module globals (spec.md §9's design note on the source's
//! global mutable tokenizer state).

use super::error::{AsmError, AsmErrorKind};
use super::tables::{control_reg_lookup, general_reg_lookup, mnemonic_lookup};

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Mnemonic(&'static str, u8, u8),
    GReg(u8),
    CReg(u8),
    Number(i64),
    Qualifier(char),
    Ident(String),
    Dot,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokKind,
    pub pos: usize,
}

pub fn tokenize(line: &str) -> Result<Vec<Token>, AsmError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    let mut tokens = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == ';' {
            break;
        }

        let kind = match c {
            ',' => {
                i += 1;
                TokKind::Comma
            }
            '.' => {
                i += 1;
                TokKind::Dot
            }
            '(' => {
                i += 1;
                TokKind::LParen
            }
            ')' => {
                i += 1;
                TokKind::RParen
            }
            '+' => {
                i += 1;
                TokKind::Plus
            }
            '-' => {
                i += 1;
                TokKind::Minus
            }
            '*' => {
                i += 1;
                TokKind::Star
            }
            '/' => {
                i += 1;
                TokKind::Slash
            }
            '%' => {
                i += 1;
                TokKind::Percent
            }
            '&' => {
                i += 1;
                TokKind::Amp
            }
            '|' => {
                i += 1;
                TokKind::Pipe
            }
            '^' => {
                i += 1;
                TokKind::Caret
            }
            '~' => {
                i += 1;
                TokKind::Tilde
            }
            _ if c.is_ascii_digit() => {
                let (value, next) = lex_number(&chars, i)?;
                i = next;
                TokKind::Number(value)
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                i = j;

                // `L%`, `R%`, `S%`, `U%` qualifiers: single letter followed by `%`.
                if word.len() == 1 && i < chars.len() && chars[i] == '%' {
                    let letter = word.chars().next().unwrap().to_ascii_uppercase();
                    if matches!(letter, 'L' | 'R' | 'S' | 'U') {
                        i += 1;
                        TokKind::Qualifier(letter)
                    } else {
                        return Err(AsmError::new(AsmErrorKind::InvalidQualifier, start));
                    }
                } else if let Some((name, g, f)) = mnemonic_lookup(&word) {
                    TokKind::Mnemonic(name, g, f)
                } else if let Some(r) = general_reg_lookup(&word) {
                    TokKind::GReg(r)
                } else if let Some(r) = control_reg_lookup(&word) {
                    TokKind::CReg(r)
                } else {
                    TokKind::Ident(word)
                }
            }
            _ => return Err(AsmError::new(AsmErrorKind::InvalidCharacter, start)),
        };

        tokens.push(Token { kind, pos: start });
    }

    tokens.push(Token {
        kind: TokKind::Eof,
        pos: chars.len(),
    });
    Ok(tokens)
}

fn lex_number(chars: &[char], mut i: usize) -> Result<(i64, usize), AsmError> {
    let start = i;
    let hex = chars[i] == '0' && i + 1 < chars.len() && (chars[i + 1] == 'x' || chars[i + 1] == 'X');
    if hex {
        i += 2;
        let digit_start = i;
        let mut text = String::new();
        while i < chars.len() && (chars[i].is_ascii_hexdigit() || chars[i] == '_') {
            if chars[i] != '_' {
                text.push(chars[i]);
            }
            i += 1;
        }
        if i == digit_start || text.is_empty() {
            return Err(AsmError::new(AsmErrorKind::InvalidNumber, start));
        }
        let value = u64::from_str_radix(&text, 16)
            .map_err(|_| AsmError::new(AsmErrorKind::InvalidNumber, start))?;
        Ok((value as i64, i))
    } else {
        let mut text = String::new();
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
            if chars[i] != '_' {
                text.push(chars[i]);
            }
            i += 1;
        }
        let value = text
            .parse::<i64>()
            .map_err(|_| AsmError::new(AsmErrorKind::InvalidNumber, start))?;
        Ok((value, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_simple_instruction() {
        let toks = tokenize("ADD R3, R1, R2").unwrap();
        assert!(matches!(toks[0].kind, TokKind::Mnemonic(_, _, _)));
        assert!(matches!(toks[1].kind, TokKind::GReg(3)));
        assert_eq!(toks[2].kind, TokKind::Comma);
    }

    #[test]
    fn tokenizes_hex_with_underscore() {
        let toks = tokenize("0x1_2345").unwrap();
        assert_eq!(toks[0].kind, TokKind::Number(0x12345));
    }

    #[test]
    fn stops_at_comment() {
        let toks = tokenize("NOP ; a comment").unwrap();
        assert_eq!(toks.len(), 2); // mnemonic + eof
    }
}
