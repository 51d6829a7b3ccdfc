//! Operator agents over other agents' scalar observables, and the scalar
//! operation library they share with the expression combinators.

use mcsim_core::math::distributions::{norm_cdf, norm_inv_cdf};
use mcsim_core::math::numeric::TINY;
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::xml::XmlTag;

use crate::agent::{Agent, AgentCore, Process};
use crate::linkage::{require, DepList, Shared, SharedFlag, SharedScalar};

/// Scalar operation of one argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// `x`
    Identity,
    /// `1 / x`
    Reciprocal,
    /// `-x`
    Negate,
    /// `|x|`
    Abs,
    /// `sqrt(x)`
    Sqrt,
    /// `exp(x)`
    Exp,
    /// `ln(x)`
    Ln,
    /// Standard normal CDF of `x`.
    NormCdf,
    /// Standard normal quantile of `x`.
    NormQuantile,
    /// `scale * x + shift`
    Affine {
        /// Multiplier.
        scale: f64,
        /// Additive term.
        shift: f64,
    },
}

impl UnaryOp {
    /// Applies the operation.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryOp::Identity => x,
            UnaryOp::Reciprocal => 1.0 / x,
            UnaryOp::Negate => -x,
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Ln => x.ln(),
            UnaryOp::NormCdf => norm_cdf(x),
            UnaryOp::NormQuantile => norm_inv_cdf(x),
            UnaryOp::Affine { scale, shift } => scale * x + shift,
        }
    }
}

/// Scalar operation of two arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `a + b`
    Sum,
    /// `a * b`
    Product,
    /// `a - b`
    Difference,
    /// `a / b`
    Quotient,
    /// `a ^ b`
    Power,
    /// `min(a, b)`
    Minimum,
    /// `max(a, b)`
    Maximum,
    /// `a mod b`
    Modulus,
}

impl BinaryOp {
    /// Applies the operation.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Sum => a + b,
            BinaryOp::Product => a * b,
            BinaryOp::Difference => a - b,
            BinaryOp::Quotient => a / b,
            BinaryOp::Power => a.powf(b),
            BinaryOp::Minimum => a.min(b),
            BinaryOp::Maximum => a.max(b),
            BinaryOp::Modulus => a % b,
        }
    }
}

/// Tolerant scalar comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `a > b` beyond the tolerance.
    Greater,
    /// `a >= b` within the tolerance.
    GreaterOrEqual,
    /// `a < b` beyond the tolerance.
    Less,
    /// `a <= b` within the tolerance.
    LessOrEqual,
    /// `|a - b|` within the tolerance.
    Equal,
    /// `|a - b|` beyond the tolerance.
    NotEqual,
}

impl CompareOp {
    /// Applies the comparison with tolerance `tol`.
    pub fn apply(self, a: f64, b: f64, tol: f64) -> bool {
        match self {
            CompareOp::Greater => a > b + tol,
            CompareOp::GreaterOrEqual => a >= b - tol,
            CompareOp::Less => a < b - tol,
            CompareOp::LessOrEqual => a <= b + tol,
            CompareOp::Equal => (a - b).abs() <= tol,
            CompareOp::NotEqual => (a - b).abs() > tol,
        }
    }
}

/// Boolean operation of two arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
    /// Exclusive or.
    Xor,
}

impl BoolOp {
    /// Applies the operation.
    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            BoolOp::And => a && b,
            BoolOp::Or => a || b,
            BoolOp::Xor => a != b,
        }
    }
}

/// Unary operator agent: `state = op(child.state)`, liveness follows the
/// child.
pub struct UnaryOperator {
    core: AgentCore<f64>,
    deps: DepList,
    source: Option<SharedScalar>,
    op: UnaryOp,
}

impl UnaryOperator {
    /// An operator applying `op` to a yet-unconnected child.
    pub fn new(op: UnaryOp) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            op,
        }
    }

    /// Connects the child.
    pub fn connect<C: Agent<State = f64> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.clear();
        self.deps.push(source);
        self.source = Some(source.clone() as SharedScalar);
    }

    fn step(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "unary operator source")?;
        self.core.state = self.op.apply(source.borrow().state());
        Ok(source.borrow().is_live())
    }
}

impl Process for UnaryOperator {
    type State = f64;

    fn core(&self) -> &AgentCore<f64> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<f64> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.source, "unary operator source").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("op", format!("{:?}", self.op))
    }
}

crate::impl_agent!(UnaryOperator);

/// Binary operator agent: left-to-right fold of `op` over one or more
/// children. Live while any child is live.
pub struct BinaryOperator {
    core: AgentCore<f64>,
    deps: DepList,
    sources: Vec<SharedScalar>,
    op: BinaryOp,
}

impl BinaryOperator {
    /// An operator folding with `op` over yet-unconnected children.
    pub fn new(op: BinaryOp) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            sources: Vec::new(),
            op,
        }
    }

    /// Appends a child; fold order is connection order.
    pub fn connect<C: Agent<State = f64> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.push(source);
        self.sources.push(source.clone() as SharedScalar);
    }

    fn step(&mut self) -> SimResult<bool> {
        let mut iter = self.sources.iter();
        let first = iter.next().ok_or_else(|| {
            SimError::not_configured("binary operator", "requires at least one source")
        })?;
        let mut live = first.borrow().is_live();
        let mut acc = first.borrow().state();
        for source in iter {
            live = live || source.borrow().is_live();
            acc = self.op.apply(acc, source.borrow().state());
        }
        self.core.state = acc;
        Ok(live)
    }
}

impl Process for BinaryOperator {
    type State = f64;

    fn core(&self) -> &AgentCore<f64> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<f64> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        if self.sources.is_empty() {
            return Err(SimError::not_configured(
                "binary operator",
                "requires at least one source",
            ));
        }
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("op", format!("{:?}", self.op))
    }
}

crate::impl_agent!(BinaryOperator);

/// Cumulative operator agent (a fold over time).
///
/// By convention the fold restarts from the child's value at reset:
/// `y0 = x0`, then `y_k = op(x_k, y_{k-1})`.
pub struct CumulativeOperator {
    core: AgentCore<f64>,
    deps: DepList,
    source: Option<SharedScalar>,
    op: BinaryOp,
}

impl CumulativeOperator {
    /// A fold with `op` over a yet-unconnected child.
    pub fn new(op: BinaryOp) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            op,
        }
    }

    /// Connects the child.
    pub fn connect<C: Agent<State = f64> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.clear();
        self.deps.push(source);
        self.source = Some(source.clone() as SharedScalar);
    }
}

impl Process for CumulativeOperator {
    type State = f64;

    fn core(&self) -> &AgentCore<f64> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<f64> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.source, "cumulative operator source").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        let source = require(&self.source, "cumulative operator source")?;
        self.core.state = source.borrow().state();
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "cumulative operator source")?;
        self.core.state = self.op.apply(source.borrow().state(), self.core.state);
        Ok(source.borrow().is_live())
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("op", format!("{:?}", self.op))
    }
}

crate::impl_agent!(CumulativeOperator);

/// Sequential operator agent (pairwise over successive child values):
/// `y_k = op(x_k, x_{k-1})`.
///
/// Without an explicit previous value the child is assumed constant before
/// the start, so the first step sees `op(x0, x0)`.
pub struct SequentialOperator {
    core: AgentCore<f64>,
    deps: DepList,
    source: Option<SharedScalar>,
    op: BinaryOp,
    last: f64,
    initial: Option<f64>,
}

impl SequentialOperator {
    /// A pairwise operator with `op` over a yet-unconnected child.
    pub fn new(op: BinaryOp) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
            op,
            last: 0.0,
            initial: None,
        }
    }

    /// Connects the child, assuming it was constant before the start.
    pub fn connect<C: Agent<State = f64> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.clear();
        self.deps.push(source);
        self.source = Some(source.clone() as SharedScalar);
        self.initial = None;
    }

    /// Connects the child with an explicit value for the step before the
    /// start.
    pub fn connect_with_initial<C: Agent<State = f64> + 'static>(
        &mut self,
        source: &Shared<C>,
        initial: f64,
    ) {
        self.connect(source);
        self.initial = Some(initial);
    }

    fn step(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "sequential operator source")?;
        let x = source.borrow().state();
        self.core.state = self.op.apply(x, self.last);
        self.last = x;
        Ok(source.borrow().is_live())
    }
}

impl Process for SequentialOperator {
    type State = f64;

    fn core(&self) -> &AgentCore<f64> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<f64> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.source, "sequential operator source").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        let source = require(&self.source, "sequential operator source")?;
        self.last = match self.initial {
            Some(x) => x,
            None => source.borrow().state(),
        };
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("op", format!("{:?}", self.op))
    }
}

crate::impl_agent!(SequentialOperator);

/// Comparison agent: boolean state `op(a.state, b.state)` under a tolerance.
pub struct ComparisonOperator {
    core: AgentCore<bool>,
    deps: DepList,
    lhs: Option<SharedScalar>,
    rhs: Option<SharedScalar>,
    op: CompareOp,
    tolerance: f64,
}

impl ComparisonOperator {
    /// A comparison with the default tolerance.
    pub fn new(op: CompareOp) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            lhs: None,
            rhs: None,
            op,
            tolerance: TINY,
        }
    }

    /// Overrides the comparison tolerance.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Connects both sides.
    pub fn connect<A, B>(&mut self, lhs: &Shared<A>, rhs: &Shared<B>)
    where
        A: Agent<State = f64> + 'static,
        B: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(lhs);
        self.deps.push(rhs);
        self.lhs = Some(lhs.clone() as SharedScalar);
        self.rhs = Some(rhs.clone() as SharedScalar);
    }

    fn step(&mut self) -> SimResult<bool> {
        let lhs = require(&self.lhs, "comparison lhs")?;
        let rhs = require(&self.rhs, "comparison rhs")?;
        self.core.state = self
            .op
            .apply(lhs.borrow().state(), rhs.borrow().state(), self.tolerance);
        Ok(lhs.borrow().is_live() || rhs.borrow().is_live())
    }
}

impl Process for ComparisonOperator {
    type State = bool;

    fn core(&self) -> &AgentCore<bool> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<bool> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.lhs, "comparison lhs")?;
        require(&self.rhs, "comparison rhs").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }
}

crate::impl_agent!(ComparisonOperator);

/// Boolean operator agent: left-to-right fold of `op` over one or more
/// boolean children.
pub struct BooleanOperator {
    core: AgentCore<bool>,
    deps: DepList,
    sources: Vec<SharedFlag>,
    op: BoolOp,
}

impl BooleanOperator {
    /// A fold with `op` over yet-unconnected children.
    pub fn new(op: BoolOp) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            sources: Vec::new(),
            op,
        }
    }

    /// Appends a child.
    pub fn connect<C: Agent<State = bool> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.push(source);
        self.sources.push(source.clone() as SharedFlag);
    }

    fn step(&mut self) -> SimResult<bool> {
        let mut iter = self.sources.iter();
        let first = iter.next().ok_or_else(|| {
            SimError::not_configured("boolean operator", "requires at least one source")
        })?;
        let mut live = first.borrow().is_live();
        let mut acc = first.borrow().state();
        for source in iter {
            live = live || source.borrow().is_live();
            acc = self.op.apply(acc, source.borrow().state());
        }
        self.core.state = acc;
        Ok(live)
    }
}

impl Process for BooleanOperator {
    type State = bool;

    fn core(&self) -> &AgentCore<bool> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<bool> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        if self.sources.is_empty() {
            return Err(SimError::not_configured(
                "boolean operator",
                "requires at least one source",
            ));
        }
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }
}

crate::impl_agent!(BooleanOperator);

/// Boolean negation agent.
pub struct NotOperator {
    core: AgentCore<bool>,
    deps: DepList,
    source: Option<SharedFlag>,
}

impl NotOperator {
    /// A negation over a yet-unconnected child.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            source: None,
        }
    }

    /// Connects the child.
    pub fn connect<C: Agent<State = bool> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.clear();
        self.deps.push(source);
        self.source = Some(source.clone() as SharedFlag);
    }

    fn step(&mut self) -> SimResult<bool> {
        let source = require(&self.source, "not operator source")?;
        self.core.state = !source.borrow().state();
        Ok(source.borrow().is_live())
    }
}

impl Default for NotOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for NotOperator {
    type State = bool;

    fn core(&self) -> &AgentCore<bool> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<bool> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.source, "not operator source").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.step().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.step()
    }
}

crate::impl_agent!(NotOperator);
