//! Model classes as the registry sees them: a name, a place in the hierarchy
//! and one callback chain per defined lifecycle event.

use std::collections::HashMap;
use std::fmt;

use ormkit_core::{CallbackErrorKind, Error, Result};

use crate::chain::CallbackChain;
use crate::filter::CallbackTarget;

/// Handle to a class inside a [`CallbackRegistry`](crate::CallbackRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

pub(crate) struct ModelClass<T> {
    pub(crate) name: String,
    pub(crate) parent: Option<ClassId>,
    /// Every class below this one, in creation order.
    pub(crate) descendants: Vec<ClassId>,
    pub(crate) chains: HashMap<String, CallbackChain<T>>,
}

impl<T: CallbackTarget> ModelClass<T> {
    pub(crate) fn root(name: String) -> Self {
        Self {
            name,
            parent: None,
            descendants: Vec::new(),
            chains: HashMap::new(),
        }
    }

    /// A subclass starts with its own copy of each of the parent's chains.
    pub(crate) fn inherit(name: String, parent_id: ClassId, parent: &Self) -> Self {
        Self {
            name,
            parent: Some(parent_id),
            descendants: Vec::new(),
            chains: parent
                .chains
                .iter()
                .map(|(chain, c)| (chain.clone(), c.copy()))
                .collect(),
        }
    }

    pub(crate) fn chain(&self, name: &str) -> Result<&CallbackChain<T>> {
        self.chains
            .get(name)
            .ok_or_else(|| unknown_chain(&self.name, name))
    }

    pub(crate) fn chain_mut(&mut self, name: &str) -> Result<&mut CallbackChain<T>> {
        let class = &self.name;
        self.chains
            .get_mut(name)
            .ok_or_else(|| unknown_chain(class, name))
    }
}

fn unknown_chain(class: &str, chain: &str) -> Error {
    Error::callback(
        CallbackErrorKind::UnknownChain,
        chain,
        format!("no such callback chain defined on {class}"),
    )
}
