//! Token-cursor, option-suffix parsing, and the integer expression grammar
//! (spec.md §4.1). All per-line parser state lives in `Cursor` rather than
//! module globals.

use super::error::{AsmError, AsmErrorKind};
use super::lexer::{TokKind, Token};
use crate::util::{extract_field64, will_add_overflow, will_div_overflow, will_mult_overflow, will_sub_overflow};

pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn cur_pos(&self) -> usize {
        self.peek().pos
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokKind::Eof)
    }

    pub fn expect_comma(&mut self) -> Result<(), AsmError> {
        if matches!(self.peek().kind, TokKind::Comma) {
            self.advance();
            Ok(())
        } else {
            Err(AsmError::new(AsmErrorKind::ExpectedComma, self.cur_pos()))
        }
    }

    pub fn expect_lparen(&mut self) -> Result<(), AsmError> {
        if matches!(self.peek().kind, TokKind::LParen) {
            self.advance();
            Ok(())
        } else {
            Err(AsmError::new(AsmErrorKind::ExpectedLParen, self.cur_pos()))
        }
    }

    pub fn expect_rparen(&mut self) -> Result<(), AsmError> {
        if matches!(self.peek().kind, TokKind::RParen) {
            self.advance();
            Ok(())
        } else {
            Err(AsmError::new(AsmErrorKind::ExpectedRParen, self.cur_pos()))
        }
    }

    pub fn expect_eof(&mut self) -> Result<(), AsmError> {
        if self.at_eof() {
            Ok(())
        } else {
            Err(AsmError::new(
                AsmErrorKind::UnexpectedTrailingInput,
                self.cur_pos(),
            ))
        }
    }

    pub fn parse_greg(&mut self) -> Result<u8, AsmError> {
        match self.advance().kind {
            TokKind::GReg(r) => Ok(r),
            _ => Err(AsmError::new(
                AsmErrorKind::ExpectedGeneralRegister,
                self.cur_pos(),
            )),
        }
    }

    pub fn parse_creg(&mut self) -> Result<u8, AsmError> {
        match self.advance().kind {
            TokKind::CReg(r) => Ok(r),
            _ => Err(AsmError::new(
                AsmErrorKind::ExpectedControlRegister,
                self.cur_pos(),
            )),
        }
    }

    /// True if the very next token is a general register (peeks without consuming).
    pub fn peek_is_greg(&self) -> bool {
        matches!(self.peek().kind, TokKind::GReg(_))
    }

    /// Collects trailing `.OPT` segments into uppercase option strings.
    pub fn parse_option_suffixes(&mut self) -> Result<Vec<(String, usize)>, AsmError> {
        let mut opts = Vec::new();
        while matches!(self.peek().kind, TokKind::Dot) {
            self.advance();
            let pos = self.cur_pos();
            match self.advance().kind {
                TokKind::Ident(s) => opts.push((s.to_ascii_uppercase(), pos)),
                TokKind::GReg(_) | TokKind::CReg(_) | TokKind::Mnemonic(_, _, _) => {
                    // Some option letters coincide with register/mnemonic names
                    // lexically (e.g. none currently, but keep this defensive).
                    return Err(AsmError::new(AsmErrorKind::UnknownOption, pos));
                }
                _ => return Err(AsmError::new(AsmErrorKind::UnknownOption, pos)),
            }
        }
        Ok(opts)
    }

    /// Parses the expression grammar, returning a plain integer. Register
    /// tokens are rejected with `TypeMismatch` since immediate slots require
    /// a numeric value.
    pub fn parse_expr(&mut self) -> Result<i64, AsmError> {
        let mut val = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Plus => '+',
                TokKind::Minus => '-',
                TokKind::Pipe => '|',
                TokKind::Caret => '^',
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_term()?;
            val = match op {
                '+' => {
                    if will_add_overflow(val, rhs) {
                        return Err(AsmError::new(AsmErrorKind::OverflowInExpression, pos));
                    }
                    val + rhs
                }
                '-' => {
                    if will_sub_overflow(val, rhs) {
                        return Err(AsmError::new(AsmErrorKind::OverflowInExpression, pos));
                    }
                    val - rhs
                }
                '|' => val | rhs,
                '^' => val ^ rhs,
                _ => unreachable!(),
            };
        }
        Ok(val)
    }

    fn parse_term(&mut self) -> Result<i64, AsmError> {
        let mut val = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Star => '*',
                TokKind::Slash => '/',
                TokKind::Percent => '%',
                TokKind::Amp => '&',
                _ => break,
            };
            let pos = self.cur_pos();
            self.advance();
            let rhs = self.parse_unary()?;
            val = match op {
                '*' => {
                    if will_mult_overflow(val, rhs) {
                        return Err(AsmError::new(AsmErrorKind::OverflowInExpression, pos));
                    }
                    val * rhs
                }
                '/' => {
                    if will_div_overflow(val, rhs) {
                        return Err(AsmError::new(AsmErrorKind::DivisionByZero, pos));
                    }
                    val / rhs
                }
                '%' => {
                    if rhs == 0 {
                        return Err(AsmError::new(AsmErrorKind::DivisionByZero, pos));
                    }
                    val % rhs
                }
                '&' => val & rhs,
                _ => unreachable!(),
            };
        }
        Ok(val)
    }

    fn parse_unary(&mut self) -> Result<i64, AsmError> {
        match self.peek().kind {
            TokKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            TokKind::Minus => {
                self.advance();
                Ok(-self.parse_unary()?)
            }
            _ => self.parse_factor(),
        }
    }

    fn parse_factor(&mut self) -> Result<i64, AsmError> {
        let pos = self.cur_pos();
        match self.advance().kind {
            TokKind::Number(n) => Ok(n),
            TokKind::Qualifier(q) => {
                let inner_pos = self.cur_pos();
                let n = match self.advance().kind {
                    TokKind::Number(n) => n,
                    _ => {
                        return Err(AsmError::new(AsmErrorKind::ExpectedImmediate, inner_pos))
                    }
                };
                let bits = n as u64;
                let extracted = match q {
                    'L' => extract_field64(bits, 10, 22),
                    'R' => extract_field64(bits, 0, 10),
                    'S' => extract_field64(bits, 32, 20),
                    'U' => extract_field64(bits, 52, 12),
                    _ => unreachable!(),
                };
                Ok(extracted as i64)
            }
            TokKind::Tilde => Ok(!self.parse_factor()?),
            TokKind::LParen => {
                let v = self.parse_expr()?;
                self.expect_rparen()?;
                Ok(v)
            }
            TokKind::GReg(_) | TokKind::CReg(_) => {
                Err(AsmError::new(AsmErrorKind::TypeMismatch, pos))
            }
            _ => Err(AsmError::new(AsmErrorKind::ExpectedImmediate, pos)),
        }
    }
}

/// Validates that `opts` contains at most one member from each group in
/// `exclusive_groups`, and that every option is a member of `allowed`.
pub fn validate_options(
    opts: &[(String, usize)],
    allowed: &[&str],
    exclusive_groups: &[&[&str]],
) -> Result<(), AsmError> {
    let mut seen: Vec<&str> = Vec::new();
    for (opt, pos) in opts {
        if !allowed.contains(&opt.as_str()) {
            return Err(AsmError::new(AsmErrorKind::UnknownOption, *pos));
        }
        if seen.contains(&opt.as_str()) {
            return Err(AsmError::new(AsmErrorKind::DuplicateOption, *pos));
        }
        seen.push(opt.as_str());
    }
    for group in exclusive_groups {
        let count = opts.iter().filter(|(o, _)| group.contains(&o.as_str())).count();
        if count > 1 {
            let pos = opts
                .iter()
                .find(|(o, _)| group.contains(&o.as_str()))
                .map(|(_, p)| *p)
                .unwrap_or(0);
            return Err(AsmError::new(
                AsmErrorKind::MutuallyExclusiveOptions,
                pos,
            ));
        }
    }
    Ok(())
}

pub fn fits_signed(val: i64, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    val >= min && val <= max
}

pub fn fits_unsigned(val: i64, bits: u32) -> bool {
    val >= 0 && (val as u64) < (1u64 << bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::lexer::tokenize;

    fn eval(expr: &str) -> i64 {
        let tokens = tokenize(expr).unwrap();
        Parser::new(&tokens).parse_expr().unwrap()
    }

    #[test]
    fn l_and_r_qualifiers_extract_disjoint_bit_ranges() {
        // 0x123456789: bits 0-9 = 0x389, bits 10-31 = 0x8D159.
        let c = 0x1_2345_6789i64;
        assert_eq!(eval(&format!("R%{c:#x}")), 0x389);
        assert_eq!(eval(&format!("L%{c:#x}")), 0x8D159);
        assert_ne!(eval(&format!("L%{c:#x}")), eval(&format!("R%{c:#x}")));
    }

    #[test]
    fn s_and_u_qualifiers_extract_high_bit_ranges() {
        let c = 0x1_2345_6789_ABCDu64 as i64;
        assert_eq!(eval(&format!("S%{c:#x}")), extract_field64(c as u64, 32, 20) as i64);
        assert_eq!(eval(&format!("U%{c:#x}")), extract_field64(c as u64, 52, 12) as i64);
    }
}
