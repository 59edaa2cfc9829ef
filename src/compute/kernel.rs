use crate::compute::bytecode::{Expr, Instr, OpCode};
use crate::compute::ledger::{as_number, EvalError};
use serde_json::Value;

/// Runs postfix code against resolved positional arguments.
pub fn execute(expr: &Expr, args: &[Option<Value>]) -> Result<f64, EvalError> {
    let mut stack: Vec<f64> = Vec::with_capacity(8);
    for &instr in expr.code() {
        match instr {
            Instr::Push(n) => stack.push(n),
            Instr::Arg(i) => stack.push(argument(args, i)?),
            Instr::Neg => {
                let x = pop(&mut stack)?;
                stack.push(-x);
            }
            Instr::Binary(op) => {
                let r = pop(&mut stack)?;
                let l = pop(&mut stack)?;
                stack.push(apply(op, l, r));
            }
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(x), true) => Ok(x),
        _ => Err(EvalError::Malformed),
    }
}

fn pop(stack: &mut Vec<f64>) -> Result<f64, EvalError> {
    stack.pop().ok_or(EvalError::Malformed)
}

#[inline(always)]
fn apply(op: OpCode, l: f64, r: f64) -> f64 {
    match op {
        OpCode::Add => l + r,
        OpCode::Sub => l - r,
        OpCode::Mul => l * r,
        OpCode::Div => l / r,
        // Truncated remainder: the sign follows the dividend.
        OpCode::Rem => l % r,
        OpCode::Pow => l.powf(r),
    }
}

fn argument(args: &[Option<Value>], index: usize) -> Result<f64, EvalError> {
    let position = index + 1;
    let value = args
        .get(index)
        .and_then(Option::as_ref)
        .ok_or(EvalError::MissingArgument { position })?;
    as_number(value).ok_or_else(|| EvalError::NotNumeric { position, value: value.clone() })
}
