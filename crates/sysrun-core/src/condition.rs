use crate::error::AppError;

/// A parsed textual condition like `">=1"`, `"==1"`, `">2"`, evaluated
/// against a match count by [`wait_for_signal`](../sysrun_user/fn.wait_for_signal.html)
/// and the `assert_grep` convenience wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Condition {
    op: Op,
    rhs: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl Condition {
    /// Parse a condition string. Recognized operators, longest first so
    /// `>=`/`<=` are not mis-split as `>`/`<`: `==`, `!=`, `>=`, `<=`, `>`,
    /// `<`.
    pub fn parse(expr: &str) -> Result<Self, AppError> {
        let expr = expr.trim();
        let (op, rest) = if let Some(r) = expr.strip_prefix("==") {
            (Op::Eq, r)
        } else if let Some(r) = expr.strip_prefix("!=") {
            (Op::Ne, r)
        } else if let Some(r) = expr.strip_prefix(">=") {
            (Op::Ge, r)
        } else if let Some(r) = expr.strip_prefix("<=") {
            (Op::Le, r)
        } else if let Some(r) = expr.strip_prefix('>') {
            (Op::Gt, r)
        } else if let Some(r) = expr.strip_prefix('<') {
            (Op::Lt, r)
        } else {
            return Err(AppError::InvalidCondition(expr.to_string()));
        };
        let rhs: i64 = rest
            .trim()
            .parse()
            .map_err(|_| AppError::InvalidCondition(expr.to_string()))?;
        Ok(Condition { op, rhs })
    }

    /// Evaluate the condition against an observed count.
    pub fn eval(&self, count: usize) -> bool {
        let count = count as i64;
        match self.op {
            Op::Eq => count == self.rhs,
            Op::Ne => count != self.rhs,
            Op::Ge => count >= self.rhs,
            Op::Le => count <= self.rhs,
            Op::Gt => count > self.rhs,
            Op::Lt => count < self.rhs,
        }
    }
}
