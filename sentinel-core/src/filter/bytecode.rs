//! Stack-machine bytecode compiled from the filter AST (§3, §4.5).
//!
//! Regex patterns referenced by `=~`/`!~` are compiled once here and
//! cached inside the resulting [`Program`]; the evaluator never
//! recompiles a pattern.

use regex::Regex;

use super::ast::{CompareOp, Expr, Literal};

#[derive(Debug, Clone)]
pub enum Op {
    LoadField(String),
    LoadInt(i64),
    LoadStr(String),
    LoadList(Vec<Literal>),
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    RegexMatch(usize),
    RegexNotMatch(usize),
    In,
    Not,
    /// If the value on top of the stack is `false`, jump to `target`
    /// leaving it in place; otherwise pop it and fall through. Used
    /// for short-circuit `AND`.
    JumpIfFalseKeep(usize),
    /// Mirror of [`Op::JumpIfFalseKeep`] for short-circuit `OR`.
    JumpIfTrueKeep(usize),
}

#[derive(Debug)]
pub struct Program {
    pub ops: Vec<Op>,
    pub regexes: Vec<Regex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub fn compile(expr: &Expr) -> Result<Program, CompileError> {
    let mut ops = Vec::new();
    let mut regexes = Vec::new();
    compile_expr(expr, &mut ops, &mut regexes)?;
    Ok(Program { ops, regexes })
}

fn compile_expr(
    expr: &Expr,
    ops: &mut Vec<Op>,
    regexes: &mut Vec<Regex>,
) -> Result<(), CompileError> {
    match expr {
        Expr::Field(name) => ops.push(Op::LoadField(name.clone())),
        Expr::Literal(Literal::Int(n)) => ops.push(Op::LoadInt(*n)),
        Expr::Literal(Literal::Str(s)) => ops.push(Op::LoadStr(s.clone())),
        Expr::Literal(Literal::List(items)) => ops.push(Op::LoadList(items.clone())),
        Expr::Not(inner) => {
            compile_expr(inner, ops, regexes)?;
            ops.push(Op::Not);
        }
        Expr::And(lhs, rhs) => {
            compile_expr(lhs, ops, regexes)?;
            let jump_idx = ops.len();
            ops.push(Op::JumpIfFalseKeep(0)); // target patched once rhs is emitted
            compile_expr(rhs, ops, regexes)?;
            let target = ops.len();
            if let Op::JumpIfFalseKeep(t) = &mut ops[jump_idx] {
                *t = target;
            }
        }
        Expr::Or(lhs, rhs) => {
            compile_expr(lhs, ops, regexes)?;
            let jump_idx = ops.len();
            ops.push(Op::JumpIfTrueKeep(0));
            compile_expr(rhs, ops, regexes)?;
            let target = ops.len();
            if let Op::JumpIfTrueKeep(t) = &mut ops[jump_idx] {
                *t = target;
            }
        }
        Expr::Compare { op, field, value } => {
            compile_expr(field, ops, regexes)?;
            match op {
                CompareOp::Match | CompareOp::NotMatch => {
                    let pattern = match value.as_ref() {
                        Expr::Literal(Literal::Str(s)) => s.clone(),
                        _ => {
                            return Err(CompileError {
                                message: "regex operand must be a string literal".into(),
                            })
                        }
                    };
                    let regex = Regex::new(&pattern).map_err(|e| CompileError {
                        message: format!("invalid regex /{pattern}/: {e}"),
                    })?;
                    let idx = regexes.len();
                    regexes.push(regex);
                    ops.push(if *op == CompareOp::Match {
                        Op::RegexMatch(idx)
                    } else {
                        Op::RegexNotMatch(idx)
                    });
                }
                CompareOp::In => {
                    compile_expr(value, ops, regexes)?;
                    ops.push(Op::In);
                }
                _ => {
                    compile_expr(value, ops, regexes)?;
                    ops.push(match op {
                        CompareOp::Eq => Op::Eq,
                        CompareOp::Ne => Op::Ne,
                        CompareOp::Lt => Op::Lt,
                        CompareOp::Gt => Op::Gt,
                        CompareOp::Le => Op::Le,
                        CompareOp::Ge => Op::Ge,
                        CompareOp::Match | CompareOp::NotMatch | CompareOp::In => unreachable!(),
                    });
                }
            }
        }
    }
    Ok(())
}
