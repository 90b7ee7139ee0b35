//! Callback and function wrappers.
//!
//! Two directions cross here:
//!
//! - **native → script**: a Rust closure becomes a script function. Each
//!   argument is extracted through [`FromScript`] in order before the closure
//!   runs; the first failure aborts the call with an index-qualified error.
//! - **script → native**: a script function is held by native code as a
//!   [`ScriptCallback`], either strongly (the callback roots the function) or
//!   weakly (invoking it after collection does nothing).
//!
//! ```ignore
//! // Plain function
//! let f = NativeFunction::new(|a: i32, b: i32| a + b);
//!
//! // Method: the receiver is bound to the first parameter
//! let m = NativeFunction::method(|this: NativeRef<Button>, title: String| {
//!     this.set_title(title);
//! });
//! ```

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use scriptbridge_core::{Exception, ObjectRef, Persistent, Value, WeakObject};

use crate::context::{Context, WeakContext};
use crate::convert::{FromScript, ToScript, ToScriptArgs};
use crate::error::{BridgeError, ConversionError};

bitflags! {
    /// Options for native functions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CallbackFlags: u8 {
        /// Extract the call receiver as the first parameter.
        const HOLDER_IS_FIRST_ARGUMENT = 1 << 0;
    }
}

// =============================================================================
// Arguments
// =============================================================================

/// Cursor over the arguments of one native call.
pub struct Arguments<'a> {
    ctx: &'a Context,
    this: &'a Value,
    args: &'a [Value],
    next: usize,
    arity: usize,
    holder_pending: bool,
}

impl<'a> Arguments<'a> {
    pub(crate) fn new(ctx: &'a Context, this: &'a Value, args: &'a [Value], flags: CallbackFlags) -> Self {
        Self {
            ctx,
            this,
            args,
            next: 0,
            arity: 0,
            holder_pending: flags.contains(CallbackFlags::HOLDER_IS_FIRST_ARGUMENT),
        }
    }

    /// The bridge context of the call.
    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    /// The call receiver.
    pub fn this(&self) -> &'a Value {
        self.this
    }

    /// Number of arguments passed.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `index`, `undefined` if absent.
    pub fn get(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// All arguments.
    pub fn values(&self) -> &'a [Value] {
        self.args
    }

    /// Arguments not yet consumed by [`Arguments::next`].
    pub fn rest(&self) -> &'a [Value] {
        self.args.get(self.next..).unwrap_or(&[])
    }

    pub(crate) fn set_arity(&mut self, arity: usize) {
        self.arity = arity;
    }

    /// Extract the receiver as `T`.
    pub fn holder<T: FromScript>(&self) -> Result<T, BridgeError> {
        T::from_script(self.ctx, self.this).map_err(BridgeError::from)
    }

    /// Extract the next parameter.
    ///
    /// A missing argument reads as `undefined`; parameters that reject it
    /// fail with [`BridgeError::ArgumentCount`].
    pub fn next<T: FromScript>(&mut self) -> Result<T, BridgeError> {
        if self.holder_pending {
            self.holder_pending = false;
            return self.holder();
        }
        let index = self.next;
        self.next += 1;
        match self.args.get(index) {
            Some(value) => T::from_script(self.ctx, value).map_err(|source| {
                BridgeError::ArgumentConversion {
                    index,
                    actual: self.ctx.runtime().type_of(value),
                    expected: T::TYPE_NAME,
                    source,
                }
            }),
            None => T::from_script(self.ctx, &Value::Undefined).map_err(|_| BridgeError::ArgumentCount {
                expected: self.arity.max(index + 1),
                actual: self.args.len(),
            }),
        }
    }
}

// =============================================================================
// Native → script
// =============================================================================

/// Type-erased body of a native function.
pub type NativeBody = Rc<dyn Fn(&mut Arguments<'_>) -> Result<Value, BridgeError>>;

/// Closures callable from script.
///
/// Implemented for `Fn` closures of up to six [`FromScript`] parameters
/// returning a [`ToScript`] value.
pub trait IntoNativeFunction<Args, Ret> {
    fn into_body(self) -> NativeBody;
}

macro_rules! impl_into_native_function {
    ($arity:expr $(, $arg:ident)*) => {
        impl<F, R, $($arg,)*> IntoNativeFunction<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: ToScript,
            $($arg: FromScript,)*
        {
            #[allow(non_snake_case)]
            fn into_body(self) -> NativeBody {
                Rc::new(move |args: &mut Arguments<'_>| {
                    args.set_arity($arity);
                    $(let $arg = args.next::<$arg>()?;)*
                    let ret = (self)($($arg),*);
                    ret.to_script(args.context()).map_err(BridgeError::from)
                })
            }
        }
    };
}

impl_into_native_function!(0);
impl_into_native_function!(1, A0);
impl_into_native_function!(2, A0, A1);
impl_into_native_function!(3, A0, A1, A2);
impl_into_native_function!(4, A0, A1, A2, A3);
impl_into_native_function!(5, A0, A1, A2, A3, A4);
impl_into_native_function!(6, A0, A1, A2, A3, A4, A5);

/// A native function ready to be exposed to script.
#[derive(Clone)]
pub struct NativeFunction {
    body: NativeBody,
    flags: CallbackFlags,
}

impl NativeFunction {
    /// Wrap a typed closure.
    pub fn new<Args, Ret>(f: impl IntoNativeFunction<Args, Ret>) -> Self {
        Self {
            body: f.into_body(),
            flags: CallbackFlags::empty(),
        }
    }

    /// Wrap a typed closure whose first parameter is the receiver.
    pub fn method<Args, Ret>(f: impl IntoNativeFunction<Args, Ret>) -> Self {
        Self::new(f).with_flags(CallbackFlags::HOLDER_IS_FIRST_ARGUMENT)
    }

    /// Wrap a closure that reads its own arguments.
    pub fn raw(f: impl Fn(&mut Arguments<'_>) -> Result<Value, BridgeError> + 'static) -> Self {
        Self {
            body: Rc::new(f),
            flags: CallbackFlags::empty(),
        }
    }

    /// Add `flags` to the ones already set.
    pub fn with_flags(mut self, flags: CallbackFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn flags(&self) -> CallbackFlags {
        self.flags
    }

    /// Call the body directly.
    pub fn invoke(&self, ctx: &Context, this: &Value, args: &[Value]) -> Result<Value, BridgeError> {
        invoke_body(ctx, &self.body, self.flags, this, args)
    }

    /// Create a script function object calling this body.
    pub fn create(&self, ctx: &Context, name: &str) -> ObjectRef {
        let context = ctx.downgrade();
        let body = self.body.clone();
        let flags = self.flags;
        ctx.runtime().new_function(name, move |_, this, args| {
            let Some(ctx) = context.upgrade() else {
                return Err(BridgeError::ContextDestroyed.into());
            };
            invoke_body(&ctx, &body, flags, this, args).map_err(Exception::from)
        })
    }
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn invoke_body(
    ctx: &Context,
    body: &NativeBody,
    flags: CallbackFlags,
    this: &Value,
    args: &[Value],
) -> Result<Value, BridgeError> {
    let _scope = ctx.enter(false)?;
    let mut arguments = Arguments::new(ctx, this, args, flags);
    body(&mut arguments)
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Script → native
// =============================================================================

/// How a [`ScriptCallback`] holds its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMode {
    /// The function is rooted until the callback is dropped.
    Strong,
    /// The function is not retained; calls after collection do nothing.
    Weak,
}

#[derive(Clone)]
enum Target {
    Strong(Persistent),
    Weak(WeakObject),
}

/// A script function held by native code.
#[derive(Clone)]
pub struct ScriptCallback {
    context: WeakContext,
    target: Target,
}

fn expect_function(ctx: &Context, value: &Value) -> Result<ObjectRef, ConversionError> {
    match value {
        Value::Object(object) if ctx.runtime().is_function(value) => Ok(*object),
        _ => Err(ConversionError::TypeMismatch {
            expected: "Function",
            actual: ctx.runtime().type_of(value),
        }),
    }
}

impl ScriptCallback {
    /// Hold `function` strongly.
    pub fn strong(ctx: &Context, function: &Value) -> Result<Self, BridgeError> {
        let object = expect_function(ctx, function)?;
        Ok(Self {
            context: ctx.downgrade(),
            target: Target::Strong(ctx.runtime().persist(object)),
        })
    }

    /// Hold `function` weakly.
    pub fn weak(ctx: &Context, function: &Value) -> Result<Self, BridgeError> {
        let object = expect_function(ctx, function)?;
        Ok(Self {
            context: ctx.downgrade(),
            target: Target::Weak(WeakObject::new(object)),
        })
    }

    pub fn mode(&self) -> CallbackMode {
        match self.target {
            Target::Strong(_) => CallbackMode::Strong,
            Target::Weak(_) => CallbackMode::Weak,
        }
    }

    /// The function value, if it and its context are still alive.
    pub fn function(&self) -> Option<Value> {
        let ctx = self.context.upgrade()?;
        self.function_in(&ctx)
    }

    fn function_in(&self, ctx: &Context) -> Option<Value> {
        match &self.target {
            Target::Strong(function) => Some(function.value()),
            Target::Weak(function) => function.upgrade(ctx.runtime()).map(Value::Object),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.function().is_some()
    }

    /// Call with raw arguments and an `undefined` receiver.
    ///
    /// Returns `Ok(None)` without calling anything when the function has been
    /// collected or its context dropped.
    pub fn call(&self, args: &[Value]) -> Result<Option<Value>, BridgeError> {
        let Some(ctx) = self.context.upgrade() else {
            log::debug!("callback skipped: context dropped");
            return Ok(None);
        };
        self.call_in(&ctx, args)
    }

    fn call_in(&self, ctx: &Context, args: &[Value]) -> Result<Option<Value>, BridgeError> {
        let Some(function) = self.function_in(ctx) else {
            log::debug!("callback skipped: function collected");
            return Ok(None);
        };
        ctx.call_function(&function, &Value::Undefined, args).map(Some)
    }

    /// Convert `args` and call.
    pub fn invoke<A: ToScriptArgs>(&self, args: A) -> Result<Option<Value>, BridgeError> {
        let Some(ctx) = self.context.upgrade() else {
            return Ok(None);
        };
        let args = args.to_script_args(&ctx)?;
        self.call_in(&ctx, &args)
    }

    /// Convert `args`, call, and convert the result.
    pub fn invoke_returning<A: ToScriptArgs, R: FromScript>(&self, args: A) -> Result<Option<R>, BridgeError> {
        let Some(ctx) = self.context.upgrade() else {
            return Ok(None);
        };
        let args = args.to_script_args(&ctx)?;
        match self.call_in(&ctx, &args)? {
            Some(ret) => ctx.from_script(&ret).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ScriptCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptCallback")
            .field("mode", &self.mode())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl FromScript for ScriptCallback {
    const TYPE_NAME: &'static str = "Function";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        let object = expect_function(ctx, value)?;
        Ok(Self {
            context: ctx.downgrade(),
            target: Target::Strong(ctx.runtime().persist(object)),
        })
    }
}

/// A [`ScriptCallback`] extracted in weak mode.
#[derive(Debug, Clone)]
pub struct WeakCallback(pub ScriptCallback);

impl FromScript for WeakCallback {
    const TYPE_NAME: &'static str = "Function";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        let object = expect_function(ctx, value)?;
        Ok(Self(ScriptCallback {
            context: ctx.downgrade(),
            target: Target::Weak(WeakObject::new(object)),
        }))
    }
}

/// A function value passed through without retaining it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptFunction(pub Value);

impl FromScript for ScriptFunction {
    const TYPE_NAME: &'static str = "Function";

    fn from_script(ctx: &Context, value: &Value) -> Result<Self, ConversionError> {
        expect_function(ctx, value)?;
        Ok(Self(value.clone()))
    }
}

impl ToScript for ScriptFunction {
    fn to_script(self, _ctx: &Context) -> Result<Value, ConversionError> {
        Ok(self.0)
    }
}
