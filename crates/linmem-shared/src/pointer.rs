//! Reference-counted handles.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use linmem_core::{Address, TypeDescriptor};
use linmem_view::{StructView, ViewStrategy};

use crate::agent::{Agent, AgentInner};
use crate::block;
use crate::error::ShareError;
use crate::registry::Destructor;
use crate::transfer::Transferable;

/// A counted share of a payload in linear memory.
///
/// Cloning takes another share; dropping or [`reset`](Self::reset) gives one
/// back. Whichever handle, in whichever agent, gives back the last share
/// releases the payload and its control block.
pub struct SharedPtr {
    agent: Rc<AgentInner>,
    /// Null once reset.
    block: Address,
}

impl SharedPtr {
    pub(crate) fn from_parts(agent: Rc<AgentInner>, block: Address) -> Self {
        Self { agent, block }
    }

    /// Payload address; null after [`reset`](Self::reset).
    pub fn get(&self) -> Address {
        if self.block.is_null() {
            return Address::NULL;
        }
        block::payload(&self.agent.acc, self.block)
    }

    /// Control block address; null after [`reset`](Self::reset).
    pub fn block(&self) -> Address {
        self.block
    }

    /// Shares held across all agents; 0 after [`reset`](Self::reset).
    pub fn use_count(&self) -> u32 {
        if self.block.is_null() {
            return 0;
        }
        block::count(&self.agent.acc, self.block)
    }

    /// Whether this is the only share.
    pub fn unique(&self) -> bool {
        self.use_count() == 1
    }

    /// Give back this handle's share and become null.
    pub fn reset(&mut self) {
        if self.block.is_null() {
            return;
        }
        let block = std::mem::replace(&mut self.block, Address::NULL);
        let destructor = self.agent.registry.borrow_mut().untrack(block);
        block::release(
            &self.agent.acc,
            &*self.agent.allocator,
            block,
            destructor.as_ref(),
        );
    }

    /// Give back this handle's share and take ownership of `payload`
    /// instead.
    ///
    /// On error the old share is kept and `payload` stays the caller's.
    ///
    /// # Panics
    ///
    /// Panics if `payload` is the one this pointer already shares; giving
    /// back the old share would free it.
    pub fn reset_to(
        &mut self,
        payload: Address,
        destructor: Option<Destructor>,
    ) -> Result<(), ShareError> {
        assert!(
            self.block.is_null() || payload != self.get(),
            "payload {payload} is already shared by this pointer"
        );
        let agent = Agent::from_inner(Rc::clone(&self.agent));
        *self = agent.make(payload, destructor)?;
        Ok(())
    }

    /// Typed view over the payload.
    ///
    /// The view is detached when this agent's last handle to the payload
    /// goes, so with checks enabled a stale view panics instead of writing
    /// into reused memory.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is null or `desc` has the wrong width.
    pub fn view<S: ViewStrategy>(&self, desc: &Arc<TypeDescriptor>) -> StructView<S> {
        let payload = self.get();
        assert!(!payload.is_null(), "cannot view through a reset pointer");
        let view = StructView::new(self.agent.acc.clone(), payload, Arc::clone(desc));
        self.agent
            .registry
            .borrow_mut()
            .attach_view(self.block, view.detach_handle());
        view
    }

    /// Take one more share and package it for another agent.
    ///
    /// # Panics
    ///
    /// Panics if the pointer is null.
    pub fn to_transferable(&self) -> Transferable {
        assert!(!self.block.is_null(), "cannot transfer a reset pointer");
        block::acquire(&self.agent.acc, self.block);
        let destructor = self
            .agent
            .registry
            .borrow()
            .destructor(self.block)
            .cloned();
        Transferable::new(
            self.agent.acc.clone(),
            Arc::clone(&self.agent.allocator),
            self.block,
            destructor,
        )
    }
}

impl Clone for SharedPtr {
    fn clone(&self) -> Self {
        if !self.block.is_null() {
            block::acquire(&self.agent.acc, self.block);
            self.agent.registry.borrow_mut().track(self.block, None);
        }
        Self {
            agent: Rc::clone(&self.agent),
            block: self.block,
        }
    }
}

impl Drop for SharedPtr {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for SharedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPtr")
            .field("block", &self.block)
            .field("payload", &self.get())
            .field("use_count", &self.use_count())
            .finish()
    }
}
