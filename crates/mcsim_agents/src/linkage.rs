//! Dependency linkage: how an agent owns and traverses its children.
//!
//! The original deep policy hierarchy collapses to composition: every agent
//! embeds a [`DepList`] (possibly empty, possibly size one) holding shared,
//! type-erased handles, and recursion is plain iteration in insertion order.
//! Agents keep separately-typed handles to the same children for state
//! access; both handles are clones of one `Rc`.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::Time;
use mcsim_core::xml::XmlSink;

use crate::agent::{Agent, Lifecycle};
use crate::driver::SimContext;

/// Shared ownership handle to a concrete agent.
pub type Shared<T> = Rc<RefCell<T>>;

/// Shared handle to any agent with state type `S`.
pub type SharedAgent<S> = Rc<RefCell<dyn Agent<State = S>>>;

/// Shared handle to a scalar-valued agent.
pub type SharedScalar = SharedAgent<f64>;

/// Shared handle to a boolean-valued agent.
pub type SharedFlag = SharedAgent<bool>;

/// Ordered list of traversal dependencies.
///
/// Traversal order is insertion order. The same child may appear under many
/// parents (and even twice in one list); the lifecycle idempotence flags
/// make repeated visits no-ops.
#[derive(Default)]
pub struct DepList {
    items: Vec<Rc<RefCell<dyn Lifecycle>>>,
}

impl DepList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a child handle.
    pub fn push<C: Lifecycle + 'static>(&mut self, child: &Shared<C>) {
        self.items.push(child.clone() as Rc<RefCell<dyn Lifecycle>>);
    }

    /// Appends an already type-erased child handle.
    pub fn push_erased(&mut self, child: Rc<RefCell<dyn Lifecycle>>) {
        self.items.push(child);
    }

    /// Removes every child.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of connected children.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no children are connected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Initialises every child in order.
    pub fn init_all(&self, start: Time, end: Time, ctx: &SimContext) -> SimResult<()> {
        for child in &self.items {
            child.borrow_mut().init(start, end, ctx)?;
        }
        Ok(())
    }

    /// Resets every child in order.
    pub fn reset_all(&self) -> SimResult<()> {
        for child in &self.items {
            child.borrow_mut().reset()?;
        }
        Ok(())
    }

    /// Advances every child to `t` in order.
    pub fn update_all(&self, t: Time) -> SimResult<()> {
        for child in &self.items {
            child.borrow_mut().update(t)?;
        }
        Ok(())
    }

    /// Dumps every child's introspection record in order.
    pub fn dump_all(&self, sink: &mut XmlSink) {
        for child in &self.items {
            child.borrow().dump(sink);
        }
    }
}

/// Unwraps a required dependency, surfacing `NotConfigured` when it was
/// never connected.
pub fn require<'a, T>(slot: &'a Option<T>, what: &'static str) -> SimResult<&'a T> {
    slot.as_ref()
        .ok_or_else(|| SimError::not_configured(what, "missing required dependency"))
}
