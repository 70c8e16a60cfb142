//! Element-wise kernels over equal-length value vectors.
//!
//! Semantics follow SQLite so that a node evaluates to the same values on
//! either backend:
//! - any null operand yields null (except `IS NULL`, `AND`/`OR` short cuts);
//! - integer arithmetic overflows into floats;
//! - division always yields a float, and division by zero yields null;
//! - remainder truncates toward zero on integer-cast operands;
//! - `LIKE` is ASCII case-insensitive with `%` and `_` wildcards.

use std::cmp::Ordering;

use tandem_core::ops::{ArithOp, BoolOp, CompareOp, UnaryOp};
use tandem_core::types::{scalar_cmp, Scalar};

use crate::error::{FrameError, Result};

fn check_len(a: &[Scalar], b: &[Scalar]) -> Result<()> {
    if a.len() != b.len() {
        return Err(FrameError::Length {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

pub fn compare(op: CompareOp, a: &[Scalar], b: &[Scalar]) -> Result<Vec<Scalar>> {
    check_len(a, b)?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| {
            if x.is_null() || y.is_null() {
                return Scalar::Null;
            }
            let ord = scalar_cmp(x, y);
            Scalar::Bool(match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Ne => ord != Ordering::Equal,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Ge => ord != Ordering::Less,
            })
        })
        .collect())
}

pub fn is_null(a: &[Scalar]) -> Vec<Scalar> {
    a.iter().map(|v| Scalar::Bool(v.is_null())).collect()
}

pub fn like(a: &[Scalar], pattern: &str) -> Vec<Scalar> {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    a.iter()
        .map(|v| match v {
            Scalar::Null => Scalar::Null,
            other => {
                let text: Vec<char> = other
                    .to_string()
                    .chars()
                    .map(|c| c.to_ascii_lowercase())
                    .collect();
                Scalar::Bool(like_match(&pattern, &text))
            }
        })
        .collect()
}

/// Wildcard match over characters with backtracking on the last `%`.
/// Case folding is ASCII only, like SQLite's built-in `LIKE`.
fn like_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

/// Three-valued `AND` / `OR`. `b` is ignored for `Not`.
pub fn logical(op: BoolOp, a: &[Scalar], b: &[Scalar]) -> Result<Vec<Scalar>> {
    if op == BoolOp::Not {
        return Ok(not(a));
    }
    check_len(a, b)?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| {
            let out = match (op, x.truthy(), y.truthy()) {
                (BoolOp::And, Some(false), _) | (BoolOp::And, _, Some(false)) => Some(false),
                (BoolOp::And, Some(true), Some(true)) => Some(true),
                (BoolOp::Or, Some(true), _) | (BoolOp::Or, _, Some(true)) => Some(true),
                (BoolOp::Or, Some(false), Some(false)) => Some(false),
                _ => None,
            };
            out.map(Scalar::Bool).unwrap_or(Scalar::Null)
        })
        .collect())
}

pub fn not(a: &[Scalar]) -> Vec<Scalar> {
    a.iter()
        .map(|v| v.truthy().map(|b| Scalar::Bool(!b)).unwrap_or(Scalar::Null))
        .collect()
}

pub fn arith(op: ArithOp, a: &[Scalar], b: &[Scalar]) -> Result<Vec<Scalar>> {
    check_len(a, b)?;
    a.iter().zip(b).map(|(x, y)| arith_scalar(op, x, y)).collect()
}

fn numeric(v: &Scalar, op: &str) -> Result<()> {
    match v {
        Scalar::Str(_) | Scalar::Bin(_) => Err(FrameError::Type(format!(
            "operator '{}' is not defined for {:?}",
            op,
            v.data_type()
        ))),
        _ => Ok(()),
    }
}

fn arith_scalar(op: ArithOp, x: &Scalar, y: &Scalar) -> Result<Scalar> {
    numeric(x, op.sql())?;
    numeric(y, op.sql())?;
    if x.is_null() || y.is_null() {
        return Ok(Scalar::Null);
    }

    if op.is_bitwise() {
        let (l, r) = (int_of(x), int_of(y));
        return Ok(Scalar::I64(match op {
            ArithOp::BitAnd => l & r,
            ArithOp::BitOr => l | r,
            _ => l ^ r,
        }));
    }

    let both_int = x.as_i64().is_some() && y.as_i64().is_some();
    let (fl, fr) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
    let out = match op {
        ArithOp::Div => {
            if fr == 0.0 {
                Scalar::Null
            } else {
                Scalar::F64(fl / fr)
            }
        }
        ArithOp::Rem => {
            let (l, r) = (int_of(x), int_of(y));
            if r == 0 {
                Scalar::Null
            } else {
                let rem = l.wrapping_rem(r);
                if both_int {
                    Scalar::I64(rem)
                } else {
                    Scalar::F64(rem as f64)
                }
            }
        }
        _ if both_int => {
            let (l, r) = (int_of(x), int_of(y));
            let checked = match op {
                ArithOp::Add => l.checked_add(r),
                ArithOp::Sub => l.checked_sub(r),
                _ => l.checked_mul(r),
            };
            match checked {
                Some(v) => Scalar::I64(v),
                None => Scalar::F64(float_op(op, fl, fr)),
            }
        }
        _ => Scalar::F64(float_op(op, fl, fr)),
    };
    Ok(out)
}

fn float_op(op: ArithOp, l: f64, r: f64) -> f64 {
    match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        _ => l * r,
    }
}

/// Integer view; floats truncate toward zero.
fn int_of(v: &Scalar) -> i64 {
    match v {
        Scalar::F64(f) => *f as i64,
        other => other.as_i64().unwrap_or(0),
    }
}

pub fn unary(op: UnaryOp, a: &[Scalar]) -> Result<Vec<Scalar>> {
    a.iter()
        .map(|v| {
            numeric(v, "unary")?;
            Ok(match (op, v) {
                (_, Scalar::Null) => Scalar::Null,
                (UnaryOp::Neg, Scalar::F64(f)) => Scalar::F64(-f),
                (UnaryOp::Neg, other) => {
                    let i = int_of(other);
                    i.checked_neg()
                        .map(Scalar::I64)
                        .unwrap_or(Scalar::F64(-(i as f64)))
                }
                (UnaryOp::BitNot, other) => Scalar::I64(!int_of(other)),
            })
        })
        .collect()
}
