/*
 * eval.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression evaluation.
//!
//! Implemented as further methods on [`Renderer`] so macro calls and
//! filter pipelines can re-enter node rendering. Name resolution searches
//! the scope stack outward, then the environment globals; missing names
//! yield Empty, or raise `UndefinedValue` in strict mode. Operand
//! coercion: Int⊕Int stays Int, mixing Int and Double promotes, `/` is
//! always Double, `//` floors, `%` follows the sign of the divisor, `~`
//! concatenates after string coercion.

use std::sync::Arc;

use ginger_source_map::Range;

use crate::ast::{BinaryOp, CallArgs, Expr, ExprKind, UnaryOp};
use crate::callable::{bind_args_with_defaults, CallParams, CallableImpl};
use crate::error::{ErrorKind, TemplateResult};
use crate::output::StringSink;
use crate::renderer::Renderer;
use crate::value::{compare_values, Value, ValueList, ValueMap};

impl<'env> Renderer<'env> {
    pub(crate) fn eval(&mut self, expr: &Expr) -> TemplateResult<Value> {
        match &expr.kind {
            ExprKind::Const(value) => Ok(value.clone()),
            ExprKind::Name(name) => self.lookup_name(name, &expr.range),
            ExprKind::Attr { obj, name } => Ok(self.eval(obj)?.get_attr(name)),
            ExprKind::Subscript { obj, index } => {
                let obj = self.eval(obj)?;
                let index = self.eval(index)?;
                Ok(obj.get_item(&index))
            }
            ExprKind::Slice {
                obj,
                start,
                stop,
                step,
            } => self.eval_slice(obj, start, stop, step, &expr.range),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, &expr.range),
            ExprKind::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, &expr.range),
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::from(values))
            }
            ExprKind::Dict(entries) => {
                let mut map = ValueMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::String(s, _) => s.to_string(),
                        other => other.to_output_string(),
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::from(map))
            }
            ExprKind::Call { callee, args } => {
                let target = self.eval(callee)?;
                let (pos, named) = self.eval_call_args(args)?;
                self.call_value(&target, pos, named, &expr.range)
            }
            ExprKind::Filter {
                expr: inner,
                name,
                args,
            } => {
                let value = self.eval(inner)?;
                self.apply_filter(name, value, args, &expr.range)
            }
            ExprKind::Test {
                expr: inner,
                name,
                args,
                negated,
            } => {
                // Strictness is suspended for test operands so that
                // `missing is defined` stays answerable in strict mode.
                let saved = self.strict;
                self.strict = false;
                let value = self.eval(inner);
                self.strict = saved;
                let result = self.apply_test(name, value?, args, &expr.range)?;
                Ok(Value::Bool(result != *negated))
            }
            ExprKind::Conditional {
                then_expr,
                cond,
                else_expr,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then_expr)
                } else {
                    match else_expr {
                        Some(else_expr) => self.eval(else_expr),
                        None => Ok(Value::Empty),
                    }
                }
            }
        }
    }

    fn lookup_name(&mut self, name: &str, range: &Range) -> TemplateResult<Value> {
        match self.scopes.lookup(name) {
            Some(value) => Ok(value),
            None if self.strict => Err(self
                .err(ErrorKind::UndefinedValue, range)
                .with_extra(name)),
            None => Ok(Value::Empty),
        }
    }

    pub(crate) fn eval_call_args(
        &mut self,
        args: &CallArgs,
    ) -> TemplateResult<(ValueList, ValueMap)> {
        let mut pos = Vec::with_capacity(args.pos.len());
        for arg in &args.pos {
            pos.push(self.eval(arg)?);
        }
        let mut named = ValueMap::new();
        for (name, arg) in &args.named {
            named.insert(name.clone(), self.eval(arg)?);
        }
        Ok((pos, named))
    }

    /// Invoke a callable value through the binding protocol.
    pub(crate) fn call_value(
        &mut self,
        value: &Value,
        pos: ValueList,
        named: ValueMap,
        range: &Range,
    ) -> TemplateResult<Value> {
        let Value::Callable(callable) = value else {
            return Err(self
                .err(ErrorKind::InvalidOperation, range)
                .with_extra("value is not callable"));
        };

        match &callable.imp {
            CallableImpl::Host(func) => {
                let bound = bind_args_with_defaults(&callable.args, pos, named)
                    .map_err(|e| self.locate(e, range))?;
                let params = CallParams {
                    args: bound.args,
                    extra_pos: bound.extra_pos,
                    extra_named: bound.extra_named,
                    scope: Some(&self.scopes),
                };
                func(&params).map_err(|e| self.locate(e, range))
            }
            CallableImpl::Macro(instance) => {
                let instance = Arc::clone(instance);
                self.invoke_macro(&instance, pos, named, None, range)
            }
            CallableImpl::Caller(instance) => {
                let instance = Arc::clone(instance);
                self.invoke_caller(&instance, pos, named, range)
            }
            CallableImpl::Block { chain, index } => {
                let chain = Arc::clone(chain);
                let index = *index;
                let mut sink = StringSink::new();
                self.render_block_at(&chain, index, &mut sink)?;
                Ok(Value::safe(sink.into_string()))
            }
            CallableImpl::LoopRecurse { stmt, depth } => {
                let stmt = Arc::clone(stmt);
                let depth = *depth;
                let bound = bind_args_with_defaults(&callable.args, pos, named)
                    .map_err(|e| self.locate(e, range))?;
                let iterable = bound.args.get("iterable").cloned().unwrap_or_default();
                let items = iterable.iteration_items().ok_or_else(|| {
                    self.err(ErrorKind::InvalidOperation, range)
                        .with_extra("value is not iterable")
                })?;
                let mut sink = StringSink::new();
                self.render_for(&stmt, Some(items), depth, &mut sink)?;
                Ok(Value::safe(sink.into_string()))
            }
        }
    }

    /// Dispatch `value | name(args…)` against the filter registry.
    pub(crate) fn apply_filter(
        &mut self,
        name: &str,
        value: Value,
        args: &CallArgs,
        range: &Range,
    ) -> TemplateResult<Value> {
        let Some(filter) = self.env.filter(name) else {
            return Err(self.err(ErrorKind::UnknownFilter, range).with_extra(name));
        };
        let (mut pos, named) = self.eval_call_args(args)?;
        pos.insert(0, value);
        self.call_value(&Value::Callable(filter), pos, named, range)
    }

    /// Dispatch `value is name(args…)` against the test registry.
    fn apply_test(
        &mut self,
        name: &str,
        value: Value,
        args: &CallArgs,
        range: &Range,
    ) -> TemplateResult<bool> {
        let Some(test) = self.env.test(name) else {
            return Err(self.err(ErrorKind::UnknownTest, range).with_extra(name));
        };
        let (mut pos, named) = self.eval_call_args(args)?;
        pos.insert(0, value);
        let result = self.call_value(&Value::Callable(test), pos, named, range)?;
        Ok(result.is_truthy())
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, range: &Range) -> TemplateResult<Value> {
        let value = self.eval(operand)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => match value {
                Value::Int(n) => match n.checked_neg() {
                    Some(n) => Ok(Value::Int(n)),
                    None => Ok(Value::Double(-(n as f64))),
                },
                Value::Double(d) => Ok(Value::Double(-d)),
                other => Err(self.invalid_op(range, &other)),
            },
            UnaryOp::Pos => match value {
                Value::Int(_) | Value::Double(_) => Ok(value),
                other => Err(self.invalid_op(range, &other)),
            },
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        range: &Range,
    ) -> TemplateResult<Value> {
        // Logical operators short-circuit and yield the deciding operand.
        match op {
            BinaryOp::And => {
                let left = self.eval(lhs)?;
                return if left.is_truthy() {
                    self.eval(rhs)
                } else {
                    Ok(left)
                };
            }
            BinaryOp::Or => {
                let left = self.eval(lhs)?;
                return if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(rhs)
                };
            }
            _ => {}
        }

        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;

        match op {
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::Ne => Ok(Value::Bool(left != right)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare_values(&left, &right).ok_or_else(|| {
                    self.err(ErrorKind::InvalidOperation, range)
                        .with_extra(left.clone())
                        .with_extra(right.clone())
                })?;
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::In | BinaryOp::NotIn => {
                let contained = right.contains(&left).ok_or_else(|| {
                    self.err(ErrorKind::InvalidOperation, range)
                        .with_extra(right.clone())
                })?;
                Ok(Value::Bool(contained == (op == BinaryOp::In)))
            }
            BinaryOp::Concat => {
                let mut text = left.to_output_string();
                text.push_str(&right.to_output_string());
                Ok(Value::from(text))
            }
            BinaryOp::Add => self.eval_add(left, right, range),
            BinaryOp::Sub => self.numeric_op(left, right, range, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => self.eval_mul(left, right, range),
            BinaryOp::Div => {
                let (a, b) = self.numeric_pair(&left, &right, range)?;
                if b == 0.0 {
                    return Err(self.division_by_zero(range));
                }
                Ok(Value::Double(a / b))
            }
            BinaryOp::FloorDiv => self.eval_floor_div(left, right, range),
            BinaryOp::Mod => self.eval_mod(left, right, range),
            BinaryOp::Pow => self.eval_pow(left, right, range),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_add(&self, left: Value, right: Value, range: &Range) -> TemplateResult<Value> {
        match (&left, &right) {
            (Value::String(a, _), Value::String(b, _)) => {
                let mut text = a.to_string();
                text.push_str(b);
                Ok(Value::from(text))
            }
            (Value::List(a), Value::List(b)) => {
                let mut items = a.as_ref().clone();
                items.extend(b.iter().cloned());
                Ok(Value::from(items))
            }
            _ => self.numeric_op(left, right, range, i64::checked_add, |a, b| a + b),
        }
    }

    fn eval_mul(&self, left: Value, right: Value, range: &Range) -> TemplateResult<Value> {
        match (&left, &right) {
            (Value::String(s, _), Value::Int(n)) | (Value::Int(n), Value::String(s, _)) => {
                let count = (*n).max(0) as usize;
                Ok(Value::from(s.repeat(count)))
            }
            _ => self.numeric_op(left, right, range, i64::checked_mul, |a, b| a * b),
        }
    }

    /// Integer arithmetic stays Int, overflow and Int/Double mixes
    /// promote to Double.
    fn numeric_op(
        &self,
        left: Value,
        right: Value,
        range: &Range,
        int_op: impl Fn(i64, i64) -> Option<i64>,
        double_op: impl Fn(f64, f64) -> f64,
    ) -> TemplateResult<Value> {
        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => match int_op(*a, *b) {
                Some(result) => Ok(Value::Int(result)),
                None => Ok(Value::Double(double_op(*a as f64, *b as f64))),
            },
            _ => {
                let (a, b) = self.numeric_pair(&left, &right, range)?;
                Ok(Value::Double(double_op(a, b)))
            }
        }
    }

    fn numeric_pair(&self, left: &Value, right: &Value, range: &Range) -> TemplateResult<(f64, f64)> {
        match (as_f64(left), as_f64(right)) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(self
                .err(ErrorKind::InvalidOperation, range)
                .with_extra(left.clone())
                .with_extra(right.clone())),
        }
    }

    fn eval_floor_div(&self, left: Value, right: Value, range: &Range) -> TemplateResult<Value> {
        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(self.division_by_zero(range));
                }
                Ok(Value::Int(floor_div(*a, *b)))
            }
            _ => {
                let (a, b) = self.numeric_pair(&left, &right, range)?;
                if b == 0.0 {
                    return Err(self.division_by_zero(range));
                }
                Ok(Value::Double((a / b).floor()))
            }
        }
    }

    /// Python modulo: the result takes the sign of the divisor.
    fn eval_mod(&self, left: Value, right: Value, range: &Range) -> TemplateResult<Value> {
        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(self.division_by_zero(range));
                }
                let mut r = a % b;
                if r != 0 && (r < 0) != (*b < 0) {
                    r += b;
                }
                Ok(Value::Int(r))
            }
            _ => {
                let (a, b) = self.numeric_pair(&left, &right, range)?;
                if b == 0.0 {
                    return Err(self.division_by_zero(range));
                }
                let mut r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r += b;
                }
                Ok(Value::Double(r))
            }
        }
    }

    fn eval_pow(&self, left: Value, right: Value, range: &Range) -> TemplateResult<Value> {
        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) if *b >= 0 => {
                match u32::try_from(*b).ok().and_then(|exp| a.checked_pow(exp)) {
                    Some(result) => Ok(Value::Int(result)),
                    None => Ok(Value::Double((*a as f64).powf(*b as f64))),
                }
            }
            _ => {
                let (a, b) = self.numeric_pair(&left, &right, range)?;
                Ok(Value::Double(a.powf(b)))
            }
        }
    }

    fn eval_slice(
        &mut self,
        obj: &Expr,
        start: &Option<Box<Expr>>,
        stop: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
        range: &Range,
    ) -> TemplateResult<Value> {
        let value = self.eval(obj)?;
        let start = self.eval_slice_bound(start, range)?;
        let stop = self.eval_slice_bound(stop, range)?;
        let step = self.eval_slice_bound(step, range)?;

        if step == Some(0) {
            return Err(self
                .err(ErrorKind::InvalidOperation, range)
                .with_extra("slice step cannot be zero"));
        }

        match &value {
            Value::String(s, _) => {
                let chars: Vec<char> = s.chars().collect();
                let text: String = slice_indices(chars.len(), start, stop, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect();
                Ok(Value::from(text))
            }
            Value::List(items) => {
                let sliced: ValueList = slice_indices(items.len(), start, stop, step)
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect();
                Ok(Value::from(sliced))
            }
            Value::DynList(list) => {
                let items = list.materialize();
                let sliced: ValueList = slice_indices(items.len(), start, stop, step)
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect();
                Ok(Value::from(sliced))
            }
            other => Err(self.invalid_op(range, other)),
        }
    }

    fn eval_slice_bound(
        &mut self,
        bound: &Option<Box<Expr>>,
        range: &Range,
    ) -> TemplateResult<Option<i64>> {
        match bound {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::Empty => Ok(None),
                Value::Int(n) => Ok(Some(n)),
                other => Err(self.invalid_op(range, &other)),
            },
        }
    }

    fn invalid_op(&self, range: &Range, value: &Value) -> crate::error::Error {
        self.err(ErrorKind::InvalidOperation, range)
            .with_extra(value.clone())
    }

    fn division_by_zero(&self, range: &Range) -> crate::error::Error {
        self.err(ErrorKind::InvalidOperation, range)
            .with_extra("division by zero")
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

/// Python floor division for integers (rounds toward negative infinity).
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Indices selected by a Python-style slice over a sequence of `len`.
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Vec<usize> {
    let len = len as i64;
    let step = step.unwrap_or(1);

    let clamp = |i: i64, low: i64, high: i64| i.max(low).min(high);
    let normalize = |i: i64| if i < 0 { i + len } else { i };

    let mut out = Vec::new();
    if step > 0 {
        let start = clamp(start.map(normalize).unwrap_or(0), 0, len);
        let stop = clamp(stop.map(normalize).unwrap_or(len), 0, len);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = clamp(start.map(normalize).unwrap_or(len - 1), -1, len - 1);
        let stop = clamp(stop.map(normalize).unwrap_or(-1), -1, len - 1);
        let mut i = start;
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_div_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(floor_div(7, -2), -4);
        assert_eq!(floor_div(-7, -2), 3);
    }

    #[test]
    fn test_slice_indices_positive_step() {
        assert_eq!(slice_indices(5, Some(1), Some(4), None), vec![1, 2, 3]);
        assert_eq!(slice_indices(5, None, None, Some(2)), vec![0, 2, 4]);
        assert_eq!(slice_indices(5, Some(-2), None, None), vec![3, 4]);
        assert_eq!(slice_indices(3, Some(10), None, None), Vec::<usize>::new());
    }

    #[test]
    fn test_slice_indices_negative_step() {
        assert_eq!(slice_indices(4, None, None, Some(-1)), vec![3, 2, 1, 0]);
        assert_eq!(slice_indices(5, Some(3), Some(0), Some(-1)), vec![3, 2, 1]);
    }

    #[test]
    fn test_large_int_compares_through_f64() {
        // Precision beyond 2^53 is lost when variants differ; the policy
        // is pinned here.
        let big = (1i64 << 53) + 1;
        assert_eq!(
            compare_values(&Value::Int(big), &Value::Double((1i64 << 53) as f64)),
            Some(std::cmp::Ordering::Equal)
        );
    }
}
