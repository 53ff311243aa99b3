//! Domain services - Default expression evaluation

use crate::domain::errors::MpalError;
use crate::domain::repositories::{ExpressionEvaluator, VariableReader};
use crate::domain::value_objects::{BinaryOp, Expression};

/// Evaluator for the [`Expression`] tree
///
/// Arithmetic wraps on overflow, comparisons and logical operators yield
/// `1`/`0`, and `And`/`Or` short-circuit. Division by zero and unknown
/// variables are fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEvaluator;

impl StandardEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn eval(&self, expr: &Expression, vars: &dyn VariableReader) -> Result<i32, MpalError> {
        match expr {
            Expression::Const(value) => Ok(*value),
            Expression::Var(name) => vars
                .read(name)
                .ok_or_else(|| MpalError::unknown_variable(name.clone())),
            Expression::Not(inner) => Ok((self.eval(inner, vars)? == 0) as i32),
            Expression::Neg(inner) => Ok(self.eval(inner, vars)?.wrapping_neg()),
            Expression::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs, vars)?;
                match op {
                    BinaryOp::And if left == 0 => return Ok(0),
                    BinaryOp::Or if left != 0 => return Ok(1),
                    _ => {}
                }
                let right = self.eval(rhs, vars)?;
                apply(*op, left, right)
            }
        }
    }
}

fn apply(op: BinaryOp, left: i32, right: i32) -> Result<i32, MpalError> {
    let value = match op {
        BinaryOp::Add => left.wrapping_add(right),
        BinaryOp::Sub => left.wrapping_sub(right),
        BinaryOp::Mul => left.wrapping_mul(right),
        BinaryOp::Div => {
            if right == 0 {
                return Err(MpalError::evaluation("division by zero"));
            }
            left.wrapping_div(right)
        }
        BinaryOp::Mod => {
            if right == 0 {
                return Err(MpalError::evaluation("modulo by zero"));
            }
            left.wrapping_rem(right)
        }
        BinaryOp::Eq => (left == right) as i32,
        BinaryOp::Ne => (left != right) as i32,
        BinaryOp::Lt => (left < right) as i32,
        BinaryOp::Le => (left <= right) as i32,
        BinaryOp::Gt => (left > right) as i32,
        BinaryOp::Ge => (left >= right) as i32,
        BinaryOp::And | BinaryOp::Or => (right != 0) as i32,
    };
    Ok(value)
}

impl ExpressionEvaluator for StandardEvaluator {
    fn evaluate(&self, expr: &Expression, vars: &dyn VariableReader) -> Result<i32, MpalError> {
        self.eval(expr, vars)
    }
}
