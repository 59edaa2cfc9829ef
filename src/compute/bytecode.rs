//! bytecode.rs
//! Turns a cell's formula into a `Program`: sanitize, tokenize, then
//! shunting-yard into postfix `Instr` code.
//!
//! Formulas are plain arithmetic over positional inputs (`$1`, `$2`, ...).
//! Everything outside digits, `.`, `+ - * / % ( )`, `$` and whitespace is
//! stripped before tokenizing, so `"balh-blah(17 - 3)"` reads as `"-(17 - 3)"`.

use super::kernel;
use super::ledger::{number_value, CompileError, EvalError};
use crate::graph::EnumTable;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl OpCode {
    fn precedence(self) -> u8 {
        match self {
            OpCode::Add | OpCode::Sub => 1,
            OpCode::Mul | OpCode::Div | OpCode::Rem => 2,
            OpCode::Pow => 3,
        }
    }

    fn is_right_assoc(self) -> bool {
        self == OpCode::Pow
    }
}

/// One step of a compiled formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    Push(f64),
    /// Zero-based argument index.
    Arg(usize),
    Neg,
    Binary(OpCode),
}

/// A formula compiled to postfix code. The kernel runs it on a value stack,
/// so nesting depth never turns into call depth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expr {
    code: Vec<Instr>,
}

impl Expr {
    pub(crate) fn new(code: Vec<Instr>) -> Self {
        Self { code }
    }

    pub fn code(&self) -> &[Instr] {
        &self.code
    }
}

/// A compiled cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Program {
    /// Always "no value".
    #[default]
    Missing,
    Constant(Value),
    Expression(Expr),
    /// Looks the first argument up in a copy of the cell's table.
    Lookup(EnumTable),
}

impl Program {
    /// Runs the program. `Ok(None)` is a natural "no value"; faults are `Err`.
    pub fn run(&self, args: &[Option<Value>]) -> Result<Option<Value>, EvalError> {
        match self {
            Program::Missing => Ok(None),
            Program::Constant(v) => Ok(Some(v.clone())),
            Program::Expression(expr) => {
                let x = kernel::execute(expr, args)?;
                number_value(x).map(Some)
            }
            Program::Lookup(table) => {
                let Some(Some(probe)) = args.first() else { return Ok(None) };
                Ok(table.get(probe).cloned())
            }
        }
    }
}

/// Drops every character a formula is not allowed to contain.
pub fn sanitize(formula: &str) -> String {
    formula
        .chars()
        .filter(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '.' | '+' | '-' | '*' | '/' | '%' | '(' | ')' | '$'))
        .collect()
}

/// Compiles a formula string for a cell with `arity` connected inputs.
pub fn compile_expression(formula: &str, arity: usize) -> Result<Expr, CompileError> {
    let clean = sanitize(formula);
    check_references(&clean, arity)?;
    let tokens = tokenize(&clean)?;
    Compiler::default().compile(&tokens)
}

/// Every `$` must be followed by a 1-based index within `arity`.
fn check_references(clean: &str, arity: usize) -> Result<(), CompileError> {
    let mut rest = clean;
    while let Some(at) = rest.find('$') {
        let tail = &rest[at + 1..];
        let digits_len = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
        let digits = &tail[..digits_len];
        match digits.parse::<usize>() {
            Ok(k) if (1..=arity).contains(&k) => {}
            _ => return Err(CompileError::UnresolvedReference(format!("${}", digits))),
        }
        rest = &tail[digits_len..];
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Arg(usize),
    Op(OpCode),
    LParen,
    RParen,
}

fn tokenize(clean: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = clean.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '0'..='9' | '.' => {
                let mut end = start + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') { break; }
                    end = i + 1;
                    chars.next();
                }
                let text = &clean[start..end];
                let n = text
                    .parse::<f64>()
                    .map_err(|_| CompileError::Build(format!("malformed number '{}'", text)))?;
                Token::Num(n)
            }
            '$' => {
                let mut k = 0usize;
                while let Some(&(_, d)) = chars.peek() {
                    let Some(digit) = d.to_digit(10) else { break };
                    k = k.saturating_mul(10).saturating_add(digit as usize);
                    chars.next();
                }
                // Range already checked by `check_references`.
                Token::Arg(k.saturating_sub(1))
            }
            '+' | '-' => {
                if chars.peek().map(|&(_, d)| d) == Some(c) {
                    return Err(CompileError::Build(format!("'{c}{c}' is not an arithmetic operator")));
                }
                Token::Op(if c == '+' { OpCode::Add } else { OpCode::Sub })
            }
            '*' => {
                if chars.peek().map(|&(_, d)| d) == Some('*') {
                    chars.next();
                    Token::Op(OpCode::Pow)
                } else {
                    Token::Op(OpCode::Mul)
                }
            }
            '/' => {
                if matches!(chars.peek(), Some(&(_, '/' | '*'))) {
                    return Err(CompileError::Build("comments are not allowed in formulas".into()));
                }
                Token::Op(OpCode::Div)
            }
            '%' => Token::Op(OpCode::Rem),
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(CompileError::Build(format!("unexpected character '{}'", other))),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Operators waiting on the shunting-yard stack.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Open,
    /// Prefix sign; `true` negates.
    Unary(bool),
    Binary(OpCode),
}

/// Shunting-yard over the token list. Prefix signs bind tighter than any
/// binary operator, and a signed operand may not be the base of `**`.
#[derive(Default)]
struct Compiler {
    code: Vec<Instr>,
    pending: Vec<Pending>,
    has_operand: bool,
}

impl Compiler {
    fn compile(mut self, tokens: &[Token]) -> Result<Expr, CompileError> {
        if tokens.is_empty() {
            return Err(CompileError::Build("empty expression".into()));
        }
        for &token in tokens {
            self.push(token)?;
        }
        self.finish()
    }

    fn push(&mut self, token: Token) -> Result<(), CompileError> {
        match (token, self.has_operand) {
            (Token::Num(n), false) => self.operand(Instr::Push(n)),
            (Token::Arg(i), false) => self.operand(Instr::Arg(i)),
            (Token::LParen, false) => self.pending.push(Pending::Open),
            (Token::Op(op @ (OpCode::Add | OpCode::Sub)), false) => {
                self.pending.push(Pending::Unary(op == OpCode::Sub))
            }
            (Token::Op(op), true) => self.binary(op)?,
            (Token::RParen, true) => self.close()?,
            (token, false) => return Err(CompileError::Build(format!("unexpected {:?}", token))),
            (token, true) => {
                return Err(CompileError::Build(format!("unexpected {:?} after complete expression", token)))
            }
        }
        Ok(())
    }

    fn operand(&mut self, instr: Instr) {
        self.code.push(instr);
        self.has_operand = true;
    }

    fn binary(&mut self, op: OpCode) -> Result<(), CompileError> {
        if op == OpCode::Pow && matches!(self.pending.last(), Some(Pending::Unary(_))) {
            return Err(CompileError::Build("unary operand of '**' must be parenthesised".into()));
        }
        while let Some(&top) = self.pending.last() {
            let pops = match top {
                Pending::Open => false,
                Pending::Unary(_) => true,
                Pending::Binary(prev) => {
                    prev.precedence() > op.precedence()
                        || (prev.precedence() == op.precedence() && !op.is_right_assoc())
                }
            };
            if !pops {
                break;
            }
            self.pending.pop();
            self.emit(top);
        }
        self.pending.push(Pending::Binary(op));
        self.has_operand = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CompileError> {
        loop {
            match self.pending.pop() {
                Some(Pending::Open) => return Ok(()),
                Some(other) => self.emit(other),
                None => return Err(CompileError::Build("unbalanced parentheses".into())),
            }
        }
    }

    fn finish(mut self) -> Result<Expr, CompileError> {
        if !self.has_operand {
            return Err(CompileError::Build("unexpected end of expression".into()));
        }
        while let Some(pending) = self.pending.pop() {
            if pending == Pending::Open {
                return Err(CompileError::Build("unbalanced parentheses".into()));
            }
            self.emit(pending);
        }
        Ok(Expr::new(self.code))
    }

    fn emit(&mut self, pending: Pending) {
        match pending {
            Pending::Unary(true) => self.code.push(Instr::Neg),
            Pending::Binary(op) => self.code.push(Instr::Binary(op)),
            Pending::Unary(false) | Pending::Open => {}
        }
    }
}
