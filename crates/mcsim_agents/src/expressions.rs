//! Lazy arithmetic combinators over agents' observables, and the agents
//! that evaluate them inside lifecycle hooks.
//!
//! Expressions let a composition bind a formula to an agent graph without
//! defining a new agent type per formula: build a tree of combinators over
//! linked leaves (an agent's `time`, `dtime`, `state` or indexed sub-state),
//! hand it to an [`ExpressionAgent`], and connect the referenced agents so
//! they advance before the expression is read.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_core::types::error::{SimError, SimResult};

use crate::agent::{Agent, AgentCore, Lifecycle, Process};
use crate::linkage::{DepList, Shared, SharedAgent, SharedScalar};
use crate::operators::{BinaryOp, CompareOp, UnaryOp};

/// A lazily evaluated value.
pub trait Expression<T> {
    /// Evaluates the expression against the current agent states.
    fn value(&self) -> T;
}

/// Shared expression handle.
pub type SharedExpr<T = f64> = Rc<dyn Expression<T>>;

/// A constant.
pub struct ConstExpr<T: Copy>(pub T);

impl<T: Copy> Expression<T> for ConstExpr<T> {
    fn value(&self) -> T {
        self.0
    }
}

/// One-argument combinator.
pub struct UnaryExpr {
    op: UnaryOp,
    arg: SharedExpr,
}

impl UnaryExpr {
    /// `op(arg)`
    pub fn new(op: UnaryOp, arg: SharedExpr) -> Self {
        Self { op, arg }
    }
}

impl Expression<f64> for UnaryExpr {
    fn value(&self) -> f64 {
        self.op.apply(self.arg.value())
    }
}

/// Two-argument combinator.
pub struct BinaryExpr {
    op: BinaryOp,
    lhs: SharedExpr,
    rhs: SharedExpr,
}

impl BinaryExpr {
    /// `op(lhs, rhs)`
    pub fn new(op: BinaryOp, lhs: SharedExpr, rhs: SharedExpr) -> Self {
        Self { op, lhs, rhs }
    }
}

impl Expression<f64> for BinaryExpr {
    fn value(&self) -> f64 {
        self.op.apply(self.lhs.value(), self.rhs.value())
    }
}

/// Tolerant comparison yielding a boolean expression.
pub struct CompareExpr {
    op: CompareOp,
    tolerance: f64,
    lhs: SharedExpr,
    rhs: SharedExpr,
}

impl CompareExpr {
    /// `op(lhs, rhs)` under `tolerance`.
    pub fn new(op: CompareOp, tolerance: f64, lhs: SharedExpr, rhs: SharedExpr) -> Self {
        Self {
            op,
            tolerance,
            lhs,
            rhs,
        }
    }
}

impl Expression<bool> for CompareExpr {
    fn value(&self) -> bool {
        self.op
            .apply(self.lhs.value(), self.rhs.value(), self.tolerance)
    }
}

/// Conditional choice between two expressions.
pub struct SelectExpr {
    condition: Rc<dyn Expression<bool>>,
    yes: SharedExpr,
    no: SharedExpr,
}

impl SelectExpr {
    /// `if condition { yes } else { no }`
    pub fn new(condition: Rc<dyn Expression<bool>>, yes: SharedExpr, no: SharedExpr) -> Self {
        Self { condition, yes, no }
    }
}

impl Expression<f64> for SelectExpr {
    fn value(&self) -> f64 {
        if self.condition.value() {
            self.yes.value()
        } else {
            self.no.value()
        }
    }
}

/// The bound agent's current time.
pub struct TimeExpr {
    agent: Rc<RefCell<dyn Lifecycle>>,
}

impl TimeExpr {
    /// Binds to `agent`.
    pub fn new<C: Lifecycle + 'static>(agent: &Shared<C>) -> Self {
        Self {
            agent: agent.clone() as Rc<RefCell<dyn Lifecycle>>,
        }
    }
}

impl Expression<f64> for TimeExpr {
    fn value(&self) -> f64 {
        self.agent.borrow().time() as f64
    }
}

/// The bound agent's most recent update interval.
pub struct IntervalExpr {
    agent: Rc<RefCell<dyn Lifecycle>>,
}

impl IntervalExpr {
    /// Binds to `agent`.
    pub fn new<C: Lifecycle + 'static>(agent: &Shared<C>) -> Self {
        Self {
            agent: agent.clone() as Rc<RefCell<dyn Lifecycle>>,
        }
    }
}

impl Expression<f64> for IntervalExpr {
    fn value(&self) -> f64 {
        self.agent.borrow().dtime() as f64
    }
}

/// The bound scalar agent's state.
pub struct StateExpr {
    agent: SharedScalar,
}

impl StateExpr {
    /// Binds to `agent`.
    pub fn new<C: Agent<State = f64> + 'static>(agent: &Shared<C>) -> Self {
        Self {
            agent: agent.clone() as SharedScalar,
        }
    }
}

impl Expression<f64> for StateExpr {
    fn value(&self) -> f64 {
        self.agent.borrow().state()
    }
}

/// One component of the bound vector agent's state.
pub struct IndexedStateExpr {
    agent: SharedAgent<Vec<f64>>,
    index: usize,
}

impl IndexedStateExpr {
    /// Binds to component `index` of `agent`.
    pub fn new<C: Agent<State = Vec<f64>> + 'static>(agent: &Shared<C>, index: usize) -> Self {
        Self {
            agent: agent.clone() as SharedAgent<Vec<f64>>,
            index,
        }
    }
}

impl Expression<f64> for IndexedStateExpr {
    fn value(&self) -> f64 {
        self.agent
            .borrow()
            .state()
            .get(self.index)
            .copied()
            .unwrap_or(0.0)
    }
}

fn zero() -> SharedExpr {
    Rc::new(ConstExpr(0.0))
}

/// Scalar agent whose state is the value of a bound expression, evaluated
/// during the matching lifecycle hook.
///
/// Agents referenced by the expression must be connected so that they are
/// advanced before the expression is read.
pub struct ExpressionAgent {
    core: AgentCore<f64>,
    deps: DepList,
    init_expr: SharedExpr,
    reset_expr: SharedExpr,
    update_expr: SharedExpr,
}

impl ExpressionAgent {
    /// An agent evaluating the zero constant in every hook.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            init_expr: zero(),
            reset_expr: zero(),
            update_expr: zero(),
        }
    }

    /// Sets identical reset and update expressions, leaving the init
    /// expression at zero.
    pub fn setup(&mut self, expression: SharedExpr) {
        self.init_expr = zero();
        self.reset_expr = expression.clone();
        self.update_expr = expression;
    }

    /// Sets the expression evaluated during `init`.
    pub fn set_init(&mut self, expression: SharedExpr) {
        self.init_expr = expression;
    }

    /// Sets the expression evaluated during `reset`.
    pub fn set_reset(&mut self, expression: SharedExpr) {
        self.reset_expr = expression;
    }

    /// Sets the expression evaluated during `update`.
    pub fn set_update(&mut self, expression: SharedExpr) {
        self.update_expr = expression;
    }

    /// Connects an agent the expressions depend on.
    pub fn connect<C: Lifecycle + 'static>(&mut self, agent: &Shared<C>) {
        self.deps.push(agent);
    }
}

impl Default for ExpressionAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for ExpressionAgent {
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
        self.core.state = self.init_expr.value();
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.core.state = self.reset_expr.value();
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.core.state = self.update_expr.value();
        Ok(true)
    }
}

crate::impl_agent!(ExpressionAgent);

struct ExprItem {
    init: SharedExpr,
    reset: SharedExpr,
    update: SharedExpr,
}

impl Default for ExprItem {
    fn default() -> Self {
        Self {
            init: zero(),
            reset: zero(),
            update: zero(),
        }
    }
}

/// Vector-state variant of [`ExpressionAgent`]: one expression triple per
/// component.
pub struct MultiExpressionAgent {
    core: AgentCore<Vec<f64>>,
    deps: DepList,
    items: Vec<ExprItem>,
}

impl MultiExpressionAgent {
    /// An agent with `size` zero components.
    pub fn new(size: usize) -> Self {
        let mut agent = Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            items: Vec::new(),
        };
        agent.resize(size);
        agent
    }

    /// Re-dimensions the agent, resetting every expression to zero.
    pub fn resize(&mut self, size: usize) {
        self.items = (0..size).map(|_| ExprItem::default()).collect();
        self.core.state = vec![0.0; size];
    }

    fn item_mut(&mut self, index: usize) -> SimResult<&mut ExprItem> {
        let len = self.items.len();
        self.items.get_mut(index).ok_or_else(|| {
            SimError::InvalidArgument(format!(
                "expression index {} exceeds dimension {}",
                index, len
            ))
        })
    }

    /// Sets the init expression of one component.
    pub fn set_init(&mut self, index: usize, expression: SharedExpr) -> SimResult<()> {
        self.item_mut(index)?.init = expression;
        Ok(())
    }

    /// Sets the reset expression of one component.
    pub fn set_reset(&mut self, index: usize, expression: SharedExpr) -> SimResult<()> {
        self.item_mut(index)?.reset = expression;
        Ok(())
    }

    /// Sets the update expression of one component.
    pub fn set_update(&mut self, index: usize, expression: SharedExpr) -> SimResult<()> {
        self.item_mut(index)?.update = expression;
        Ok(())
    }

    /// Sets a zero init expression and identical reset/update expressions
    /// for one component.
    pub fn set_all(&mut self, index: usize, expression: SharedExpr) -> SimResult<()> {
        let item = self.item_mut(index)?;
        item.init = zero();
        item.reset = expression.clone();
        item.update = expression;
        Ok(())
    }

    /// Connects an agent the expressions depend on.
    pub fn connect<C: Lifecycle + 'static>(&mut self, agent: &Shared<C>) {
        self.deps.push(agent);
    }
}

impl Process for MultiExpressionAgent {
    type State = Vec<f64>;

    fn core(&self) -> &AgentCore<Vec<f64>> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<Vec<f64>> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        for (i, item) in self.items.iter().enumerate() {
            self.core.state[i] = item.init.value();
        }
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        for (i, item) in self.items.iter().enumerate() {
            self.core.state[i] = item.reset.value();
        }
        Ok(())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        for (i, item) in self.items.iter().enumerate() {
            self.core.state[i] = item.update.value();
        }
        Ok(true)
    }
}

crate::impl_agent!(MultiExpressionAgent);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::TimeProcess;
    use crate::driver::SimContext;
    use approx::assert_relative_eq;

    fn time_agent() -> Shared<TimeProcess> {
        Rc::new(RefCell::new(TimeProcess::new()))
    }

    #[test]
    fn constant_and_combinators() {
        let two: SharedExpr = Rc::new(ConstExpr(2.0));
        let three: SharedExpr = Rc::new(ConstExpr(3.0));
        let sum = BinaryExpr::new(BinaryOp::Sum, two.clone(), three);
        assert_relative_eq!(sum.value(), 5.0);

        let neg = UnaryExpr::new(UnaryOp::Negate, two);
        assert_relative_eq!(neg.value(), -2.0);
    }

    #[test]
    fn select_follows_condition() {
        let yes: SharedExpr = Rc::new(ConstExpr(1.0));
        let no: SharedExpr = Rc::new(ConstExpr(-1.0));
        let cond = Rc::new(CompareExpr::new(
            CompareOp::Greater,
            1e-16,
            Rc::new(ConstExpr(2.0)),
            Rc::new(ConstExpr(1.0)),
        ));
        let select = SelectExpr::new(cond, yes, no);
        assert_relative_eq!(select.value(), 1.0);
    }

    #[test]
    fn linked_expressions_read_the_agent() {
        let ctx = SimContext::standalone();
        let t = time_agent();
        t.borrow_mut().init(0, 100, &ctx).unwrap();
        t.borrow_mut().reset().unwrap();
        t.borrow_mut().update(30).unwrap();

        assert_relative_eq!(TimeExpr::new(&t).value(), 30.0);
        assert_relative_eq!(IntervalExpr::new(&t).value(), 30.0);
        assert_relative_eq!(StateExpr::new(&t).value(), 30.0);
    }

    #[test]
    fn expression_agent_evaluates_per_hook() {
        let ctx = SimContext::standalone();
        let t = time_agent();

        let mut agent = ExpressionAgent::new();
        // state = 2 * time + 1
        let expr: SharedExpr = Rc::new(UnaryExpr::new(
            UnaryOp::Affine {
                scale: 2.0,
                shift: 1.0,
            },
            Rc::new(StateExpr::new(&t)),
        ));
        agent.setup(expr);
        agent.connect(&t);

        agent.init(0, 100, &ctx).unwrap();
        assert_relative_eq!(agent.state(), 0.0); // init expression is zero
        agent.reset().unwrap();
        assert_relative_eq!(agent.state(), 1.0);
        agent.update(10).unwrap();
        assert_relative_eq!(agent.state(), 21.0);
    }

    #[test]
    fn multi_expression_agent_components() {
        let ctx = SimContext::standalone();
        let t = time_agent();

        let mut agent = MultiExpressionAgent::new(2);
        agent
            .set_all(0, Rc::new(StateExpr::new(&t)))
            .unwrap();
        agent
            .set_all(
                1,
                Rc::new(UnaryExpr::new(UnaryOp::Negate, Rc::new(StateExpr::new(&t)))),
            )
            .unwrap();
        agent.connect(&t);

        agent.init(0, 100, &ctx).unwrap();
        agent.reset().unwrap();
        agent.update(7).unwrap();
        assert_eq!(agent.state(), vec![7.0, -7.0]);

        let indexed = IndexedStateExpr::new(
            &Rc::new(RefCell::new(agent)),
            1,
        );
        assert_relative_eq!(indexed.value(), -7.0);
    }

    #[test]
    fn out_of_range_component_is_rejected() {
        let mut agent = MultiExpressionAgent::new(1);
        let err = agent.set_update(3, Rc::new(ConstExpr(1.0))).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument(_)));
    }
}
