//! The capability registry: command name → invocable operation.
//!
//! The table is registered explicitly, built once per target type and
//! reused for every message; nothing is resolved on the dispatch hot path.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hoist_wire::{Message, Shape, Value};

use crate::errors::{DispatchError, HandlerError};

/// Future returned by an operation invocation.
pub type InvokeFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// An operation body: receives the target and the decoded arguments, in
/// declared parameter order.
pub type InvokeFn<T> = fn(Arc<T>, Vec<Value>) -> InvokeFuture;

/// One declared parameter of an operation.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub shape: Shape,
}

impl ParamSpec {
    pub fn new(name: &'static str, shape: Shape) -> Self {
        Self { name, shape }
    }
}

/// A registered operation: its command name, parameter shapes, and body.
pub struct OperationDescriptor<T: ?Sized> {
    name: &'static str,
    params: Vec<ParamSpec>,
    invoke: InvokeFn<T>,
}

impl<T: ?Sized> OperationDescriptor<T> {
    /// The wire command this operation responds to.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared parameters, in order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Decode this operation's declared parameters out of a message.
    /// Missing fields decode to zero values, never an error.
    pub fn decode_args(&self, msg: &Message) -> Vec<Value> {
        self.params
            .iter()
            .map(|param| msg.extract(param.name, &param.shape))
            .collect()
    }

    /// Invoke the operation body.
    pub fn invoke(&self, target: Arc<T>, args: Vec<Value>) -> InvokeFuture {
        (self.invoke)(target, args)
    }
}

impl<T: ?Sized> std::fmt::Debug for OperationDescriptor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Lookup table from command name to operation, for one target type.
///
/// Build once with [`Registry::build`], reuse for every dispatched message.
pub struct Registry<T: ?Sized> {
    ops: HashMap<&'static str, OperationDescriptor<T>>,
}

impl<T: ?Sized> Registry<T> {
    /// Start building a registry.
    pub fn build() -> RegistryBuilder<T> {
        RegistryBuilder {
            ops: HashMap::new(),
        }
    }

    /// Look up the operation for `command`.
    pub fn lookup(&self, command: &str) -> Result<&OperationDescriptor<T>, DispatchError> {
        self.ops
            .get(command)
            .ok_or_else(|| DispatchError::UnknownOperation {
                command: command.to_owned(),
            })
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Builder for [`Registry`].
pub struct RegistryBuilder<T: ?Sized> {
    ops: HashMap<&'static str, OperationDescriptor<T>>,
}

impl<T: ?Sized> RegistryBuilder<T> {
    /// Register an operation. Re-registering a name replaces the previous
    /// entry.
    pub fn op(mut self, name: &'static str, params: Vec<ParamSpec>, invoke: InvokeFn<T>) -> Self {
        self.ops.insert(
            name,
            OperationDescriptor {
                name,
                params,
                invoke,
            },
        );
        self
    }

    pub fn finish(self) -> Registry<T> {
        Registry { ops: self.ops }
    }
}
