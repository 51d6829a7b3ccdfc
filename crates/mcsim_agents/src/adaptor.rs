//! Projects a field of a composite-state agent into a scalar agent view.

use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::{short_type_name, XmlSink, XmlTag};

use crate::agent::{Agent, Lifecycle};
use crate::driver::SimContext;
use crate::linkage::Shared;

/// Adaptor presenting one field of a composite-state agent as an agent in
/// its own right.
///
/// Lifecycle calls forward to the wrapped parent, so the adaptor can stand
/// anywhere an ordinary agent can; it is how scalar observers attach to
/// instrument states.
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use mcsim_agents::adaptor::StateAdaptor;
/// use mcsim_agents::basic::Constant;
/// use mcsim_agents::agent::Agent;
///
/// let pair = Rc::new(RefCell::new(Constant::new((1.5f64, true))));
/// let first = StateAdaptor::new(&pair, |s: &(f64, bool)| s.0);
/// assert_eq!(first.state(), 1.5);
/// ```
pub struct StateAdaptor<P: Agent, T> {
    parent: Shared<P>,
    lens: fn(&P::State) -> T,
}

impl<P: Agent, T> StateAdaptor<P, T> {
    /// Wraps `parent`, projecting its state through `lens`.
    pub fn new(parent: &Shared<P>, lens: fn(&P::State) -> T) -> Self {
        Self {
            parent: parent.clone(),
            lens,
        }
    }
}

impl<P: Agent + 'static, T: Clone + 'static> Lifecycle for StateAdaptor<P, T> {
    fn init(&mut self, start: Time, end: Time, ctx: &SimContext) -> SimResult<()> {
        self.parent.borrow_mut().init(start, end, ctx)
    }

    fn reset(&mut self) -> SimResult<()> {
        self.parent.borrow_mut().reset()
    }

    fn update(&mut self, t: Time) -> SimResult<()> {
        self.parent.borrow_mut().update(t)
    }

    fn is_live(&self) -> bool {
        self.parent.borrow().is_live()
    }

    fn time(&self) -> Time {
        self.parent.borrow().time()
    }

    fn dtime(&self) -> Span {
        self.parent.borrow().dtime()
    }

    fn dump(&self, sink: &mut XmlSink) {
        sink.open(XmlTag::new(short_type_name::<Self>()).attr("node", format!("{:p}", self)));
        self.parent.borrow().dump(sink);
        sink.close();
    }
}

impl<P: Agent + 'static, T: Clone + 'static> Agent for StateAdaptor<P, T> {
    type State = T;

    fn state(&self) -> T {
        let state = self.parent.borrow().state();
        (self.lens)(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::Constant;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn adaptor_forwards_lifecycle_and_projects_state() {
        let ctx = SimContext::standalone();
        let parent = Rc::new(RefCell::new(Constant::new((2.0f64, 7.0f64))));
        let mut adaptor = StateAdaptor::new(&parent, |s: &(f64, f64)| s.1);

        adaptor.init(0, 10, &ctx).unwrap();
        adaptor.reset().unwrap();
        adaptor.update(5).unwrap();
        assert_eq!(adaptor.state(), 7.0);
        assert_eq!(adaptor.time(), 5);
        assert_eq!(parent.borrow().time(), 5);
        assert!(adaptor.is_live());
    }

    #[test]
    fn two_adaptors_share_one_parent() {
        let ctx = SimContext::standalone();
        let parent = Rc::new(RefCell::new(Constant::new((1.0f64, -1.0f64))));
        let mut a = StateAdaptor::new(&parent, |s: &(f64, f64)| s.0);
        let b = StateAdaptor::new(&parent, |s: &(f64, f64)| s.1);

        a.init(0, 10, &ctx).unwrap();
        assert_eq!(a.state(), 1.0);
        assert_eq!(b.state(), -1.0);
    }
}
