//! Hand-written operations and the resolved-operation view the dispatcher
//! works with.

use std::fmt;

use crate::accessor::Accessor;
use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::Result;
use crate::value::Value;

/// Signature of a hand-written operation. Arguments arrive with the session
/// token already stripped (except for token-consuming operations).
pub type Handler = fn(&XenApi, &ApiClass, &[Value]) -> Result<Option<Value>>;

/// How an operation relates to the implicit session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUse {
    /// Login family: no token is expected.
    None,
    /// Token comes first and is stripped before the call.
    Implicit,
    /// Token comes first and is passed through as the first argument.
    Consumed,
}

impl SessionUse {
    pub fn for_method(name: &str) -> Self {
        if name.starts_with("login_") || name.starts_with("slave_local_login_") {
            SessionUse::None
        } else if name == "logout" || name == "local_logout" {
            SessionUse::Consumed
        } else {
            SessionUse::Implicit
        }
    }
}

/// Declared parameter count of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub required: usize,
    pub optional: usize,
}

impl Arity {
    pub fn exact(required: usize) -> Self {
        Self {
            required,
            optional: 0,
        }
    }

    /// Full declared count, reported as the expected count on mismatch.
    pub fn declared(&self) -> usize {
        self.required + self.optional
    }

    pub fn accepts(&self, supplied: isize) -> bool {
        supplied >= self.required as isize && supplied <= self.declared() as isize
    }
}

/// A hand-written operation of a class.
#[derive(Clone)]
pub struct Method {
    name: &'static str,
    arity: Arity,
    session: SessionUse,
    handler: Handler,
}

impl Method {
    pub fn new(name: &'static str, params: usize, handler: Handler) -> Self {
        Self {
            name,
            arity: Arity::exact(params),
            session: SessionUse::for_method(name),
            handler,
        }
    }

    /// Declare the last `count` parameters as optional.
    pub fn with_optional(mut self, count: usize) -> Self {
        let total = self.arity.declared();
        let count = count.min(total);
        self.arity = Arity {
            required: total - count,
            optional: count,
        };
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn session_use(&self) -> SessionUse {
        self.session
    }

    pub fn call(&self, api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
        (self.handler)(api, class, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("session", &self.session)
            .finish()
    }
}

/// An operation resolved on a class, hand-written or synthesized.
#[derive(Debug)]
pub enum Operation<'a> {
    Method(&'a Method),
    Accessor(Accessor),
}

impl Operation<'_> {
    pub fn arity(&self) -> Arity {
        match self {
            Operation::Method(method) => method.arity(),
            Operation::Accessor(accessor) => Arity::exact(accessor.arity()),
        }
    }

    pub fn session_use(&self) -> SessionUse {
        match self {
            Operation::Method(method) => method.session_use(),
            Operation::Accessor(_) => SessionUse::Implicit,
        }
    }

    pub fn invoke(&self, api: &XenApi, class: &ApiClass, args: &[Value]) -> Result<Option<Value>> {
        match self {
            Operation::Method(method) => method.call(api, class, args),
            Operation::Accessor(accessor) => accessor.apply(class, args),
        }
    }
}
