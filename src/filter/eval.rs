use anyhow::{bail, Result};
use polars::prelude::*;

use super::{CmpOp, Literal, ValueFilter};

/// Evaluate `filter` against `df`, returning matching row positions in
/// store order.
pub(super) fn matches(filter: &ValueFilter, df: &DataFrame) -> Result<Vec<usize>> {
    let mask = df
        .clone()
        .lazy()
        .select([to_expr(filter)?.alias("selected")])
        .collect()?;
    let mask = mask.column("selected")?.bool()?;
    Ok(mask
        .into_iter()
        .enumerate()
        .filter_map(|(i, keep)| (keep == Some(true)).then_some(i))
        .collect())
}

fn to_expr(filter: &ValueFilter) -> Result<Expr> {
    let expr = match filter {
        ValueFilter::Cmp { column, op, value } => {
            let lhs = col(column);
            let rhs = lit_expr(value);
            match op {
                CmpOp::Eq => lhs.eq(rhs),
                CmpOp::Ne => lhs.neq(rhs),
                CmpOp::Lt => lhs.lt(rhs),
                CmpOp::Le => lhs.lt_eq(rhs),
                CmpOp::Gt => lhs.gt(rhs),
                CmpOp::Ge => lhs.gt_eq(rhs),
            }
        }
        ValueFilter::In { column, values } => col(column).is_in(lit(list_series(values)?)),
        ValueFilter::Not(inner) => to_expr(inner)?.not(),
        ValueFilter::And(a, b) => to_expr(a)?.and(to_expr(b)?),
        ValueFilter::Or(a, b) => to_expr(a)?.or(to_expr(b)?),
    };
    Ok(expr)
}

fn lit_expr(value: &Literal) -> Expr {
    match value {
        Literal::Int(v) => lit(*v),
        Literal::Float(v) => lit(*v),
        Literal::Str(v) => lit(v.clone()),
        Literal::Bool(v) => lit(*v),
    }
}

/// An `in` list must hold values of one kind; ints and floats may mix and
/// are widened to floats.
fn list_series(values: &[Literal]) -> Result<Series> {
    let series = if values.iter().all(|v| matches!(v, Literal::Str(_))) {
        values
            .iter()
            .map(|v| match v {
                Literal::Str(s) => s.as_str(),
                _ => unreachable!(),
            })
            .collect::<Series>()
    } else if values.iter().all(|v| matches!(v, Literal::Int(_))) {
        values
            .iter()
            .map(|v| match v {
                Literal::Int(i) => *i,
                _ => unreachable!(),
            })
            .collect::<Series>()
    } else if values
        .iter()
        .all(|v| matches!(v, Literal::Int(_) | Literal::Float(_)))
    {
        values
            .iter()
            .map(|v| match v {
                Literal::Int(i) => *i as f64,
                Literal::Float(x) => *x,
                _ => unreachable!(),
            })
            .collect::<Series>()
    } else if values.iter().all(|v| matches!(v, Literal::Bool(_))) {
        values
            .iter()
            .map(|v| matches!(v, Literal::Bool(true)))
            .collect::<Series>()
    } else {
        bail!("'in' list mixes value types");
    };
    Ok(series)
}
