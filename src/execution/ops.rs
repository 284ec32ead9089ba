//! Scalar, string, logical, and set-theoretic primitives.
//!
//! Shared between the executor (Bop/Uop/Func dispatch) and the optimizer's
//! constant folder, so a folded expression means exactly what the executor
//! would have computed.

use std::cmp::Ordering;

use crate::execution::ExecError;
use crate::tcalc::Op;
use crate::types::TypeManager;
use crate::value::Value;

type Result<T> = std::result::Result<T, ExecError>;

enum Num {
    I(i32),
    F(f64),
}

/// Numeric operand coercion follows the value model's equality promotions:
/// ints stay ints, floats spread, numeric strings convert.
fn tonum(v: &Value) -> Result<Num> {
    match v {
        Value::Int(i) => Ok(Num::I(*i)),
        Value::Float(f) => Ok(Num::F(*f)),
        Value::Str(s) => {
            if let Ok(i) = s.trim().parse::<i32>() {
                Ok(Num::I(i))
            } else if let Ok(f) = s.trim().parse::<f64>() {
                Ok(Num::F(f))
            } else {
                Err(ExecError::Type(format!("{} is not a number", v)))
            }
        }
        _ => Err(ExecError::Type(format!("{} is not a number", v))),
    }
}

fn arith(
    a: &Value,
    b: &Value,
    fi: impl Fn(i32, i32) -> Result<i32>,
    ff: impl Fn(f64, f64) -> f64,
) -> Result<Value> {
    match (tonum(a)?, tonum(b)?) {
        (Num::I(x), Num::I(y)) => Ok(Value::Int(fi(x, y)?)),
        (x, y) => {
            let x = match x {
                Num::I(i) => i as f64,
                Num::F(f) => f,
            };
            let y = match y {
                Num::I(i) => i as f64,
                Num::F(f) => f,
            };
            Ok(Value::Float(ff(x, y)))
        }
    }
}

/// Ordering for `<`-family operators: numeric when both sides convert,
/// lexicographic for two strings.
fn order_of(a: &Value, b: &Value) -> Result<Ordering> {
    if a.is_string() && b.is_string() {
        return Ok(a.as_str().cmp(b.as_str()));
    }
    let (x, y) = (tonum(a)?, tonum(b)?);
    match (x, y) {
        (Num::I(x), Num::I(y)) => Ok(x.cmp(&y)),
        (x, y) => {
            let x = match x {
                Num::I(i) => i as f64,
                Num::F(f) => f,
            };
            let y = match y {
                Num::I(i) => i as f64,
                Num::F(f) => f,
            };
            Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
        }
    }
}

fn want(args: &[Value], n: usize, op: Op) -> Result<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(ExecError::Type(format!(
            "{} takes {} argument(s), got {}",
            op.name(),
            n,
            args.len()
        )))
    }
}

fn want_coll(v: &Value, op: Op) -> Result<()> {
    if v.is_coll() {
        Ok(())
    } else {
        Err(ExecError::Type(format!(
            "{} needs a set or sequence, got {}",
            op.name(),
            v
        )))
    }
}

fn contains(coll: &Value, v: &Value) -> bool {
    coll.coll_members().iter().any(|m| m.eq_value(v))
}

/// Evaluate one primitive over already-evaluated operands.
pub fn apply_op(tm: &TypeManager, op: Op, args: &[Value]) -> Result<Value> {
    match op {
        // ---------------- logical ----------------
        Op::And => {
            want(args, 2, op)?;
            Ok(Value::Bool(args[0].truth() && args[1].truth()))
        }
        Op::Or => {
            want(args, 2, op)?;
            Ok(Value::Bool(args[0].truth() || args[1].truth()))
        }
        Op::Not => {
            want(args, 1, op)?;
            Ok(Value::Bool(!args[0].truth()))
        }

        // ---------------- comparison ----------------
        Op::Eq => {
            want(args, 2, op)?;
            Ok(Value::Bool(args[0].eq_value(&args[1])))
        }
        Op::NotEq => {
            want(args, 2, op)?;
            Ok(Value::Bool(!args[0].eq_value(&args[1])))
        }
        Op::Lt => {
            want(args, 2, op)?;
            Ok(Value::Bool(order_of(&args[0], &args[1])? == Ordering::Less))
        }
        Op::LtEq => {
            want(args, 2, op)?;
            Ok(Value::Bool(order_of(&args[0], &args[1])? != Ordering::Greater))
        }
        Op::Gt => {
            want(args, 2, op)?;
            Ok(Value::Bool(
                order_of(&args[0], &args[1])? == Ordering::Greater,
            ))
        }
        Op::GtEq => {
            want(args, 2, op)?;
            Ok(Value::Bool(order_of(&args[0], &args[1])? != Ordering::Less))
        }

        // ---------------- arithmetic ----------------
        Op::Add => {
            want(args, 2, op)?;
            arith(&args[0], &args[1], |x, y| Ok(x.wrapping_add(y)), |x, y| x + y)
        }
        Op::Sub => {
            want(args, 2, op)?;
            arith(&args[0], &args[1], |x, y| Ok(x.wrapping_sub(y)), |x, y| x - y)
        }
        Op::Mul => {
            want(args, 2, op)?;
            arith(&args[0], &args[1], |x, y| Ok(x.wrapping_mul(y)), |x, y| x * y)
        }
        Op::Div => {
            want(args, 2, op)?;
            arith(
                &args[0],
                &args[1],
                |x, y| {
                    if y == 0 {
                        Err(ExecError::Type("division by zero".to_owned()))
                    } else {
                        Ok(x.wrapping_div(y))
                    }
                },
                |x, y| x / y,
            )
        }
        Op::Mod => {
            want(args, 2, op)?;
            arith(
                &args[0],
                &args[1],
                |x, y| {
                    if y == 0 {
                        Err(ExecError::Type("modulus by zero".to_owned()))
                    } else {
                        Ok(x.wrapping_rem(y))
                    }
                },
                |x, y| x % y,
            )
        }
        Op::Neg => {
            want(args, 1, op)?;
            match tonum(&args[0])? {
                Num::I(i) => Ok(Value::Int(i.wrapping_neg())),
                Num::F(f) => Ok(Value::Float(-f)),
            }
        }
        Op::Abs => {
            want(args, 1, op)?;
            match tonum(&args[0])? {
                Num::I(i) => Ok(Value::Int(i.wrapping_abs())),
                Num::F(f) => Ok(Value::Float(f.abs())),
            }
        }

        // ---------------- string ----------------
        Op::Concat => {
            want(args, 2, op)?;
            match (&args[0], &args[1]) {
                (Value::Str(a), Value::Str(b)) => {
                    let mut s = a.clone();
                    s.push_str(b);
                    Ok(Value::Str(s))
                }
                _ => Err(ExecError::Type(format!(
                    "concat of non-strings {} and {}",
                    args[0], args[1]
                ))),
            }
        }
        Op::StrLen => {
            want(args, 1, op)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i32)),
                v => Err(ExecError::Type(format!("strlen of non-string {}", v))),
            }
        }
        Op::ToString => {
            want(args, 1, op)?;
            Ok(Value::string(args[0].to_string()))
        }

        // ---------------- sets and sequences ----------------
        Op::Union => {
            want(args, 2, op)?;
            want_coll(&args[0], op)?;
            want_coll(&args[1], op)?;
            let mut out = Value::empty_set(tm);
            for m in args[0].coll_members() {
                if !contains(&out, m) {
                    widen_add(tm, &mut out, m.clone());
                }
            }
            for m in args[1].coll_members() {
                if !contains(&out, m) {
                    widen_add(tm, &mut out, m.clone());
                }
            }
            Ok(out)
        }
        Op::Intersect => {
            want(args, 2, op)?;
            want_coll(&args[0], op)?;
            want_coll(&args[1], op)?;
            let mut out = Value::empty_set(tm);
            for m in args[0].coll_members() {
                if contains(&args[1], m) && !contains(&out, m) {
                    widen_add(tm, &mut out, m.clone());
                }
            }
            Ok(out)
        }
        Op::Except => {
            want(args, 2, op)?;
            want_coll(&args[0], op)?;
            want_coll(&args[1], op)?;
            let mut out = Value::empty_set(tm);
            for m in args[0].coll_members() {
                if !contains(&args[1], m) && !contains(&out, m) {
                    widen_add(tm, &mut out, m.clone());
                }
            }
            Ok(out)
        }
        Op::In => {
            want(args, 2, op)?;
            want_coll(&args[1], op)?;
            Ok(Value::Bool(contains(&args[1], &args[0])))
        }
        Op::NonEmpty => {
            want(args, 1, op)?;
            want_coll(&args[0], op)?;
            Ok(Value::Bool(args[0].coll_num() > 0))
        }
        Op::Count => {
            want(args, 1, op)?;
            want_coll(&args[0], op)?;
            Ok(Value::Int(args[0].coll_num() as i32))
        }
        Op::Min => {
            want(args, 1, op)?;
            want_coll(&args[0], op)?;
            Ok(args[0]
                .coll_members()
                .iter()
                .min_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(Value::Nil))
        }
        Op::Max => {
            want(args, 1, op)?;
            want_coll(&args[0], op)?;
            Ok(args[0]
                .coll_members()
                .iter()
                .max_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(Value::Nil))
        }
        Op::Sum => {
            want(args, 1, op)?;
            want_coll(&args[0], op)?;
            let mut acc = Value::Int(0);
            for m in args[0].coll_members() {
                acc = apply_op(tm, Op::Add, &[acc, m.clone()])?;
            }
            Ok(acc)
        }
        Op::Choose => {
            want(args, 1, op)?;
            want_coll(&args[0], op)?;
            Ok(args[0]
                .coll_members()
                .first()
                .cloned()
                .unwrap_or(Value::Nil))
        }
    }
}

fn widen_add(tm: &TypeManager, coll: &mut Value, v: Value) {
    match coll {
        Value::Set { elem, members } | Value::Sequence { elem, members } => {
            *elem = tm.generalize(elem, &v.datatype(tm));
            members.push(v);
        }
        _ => crate::contract::contract_violation("widen_add on non-collection"),
    }
}
