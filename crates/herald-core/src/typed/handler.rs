//! Handler - typed callables and their type-erased form.
//!
//! Two layers, same as any registry that has to store heterogeneous handlers:
//! - **Typed**: `Handler<Args>` is implemented for every `Fn(A1, .., An)` that
//!   returns `()`. A closure returning a value simply does not implement it, so
//!   `add_handler` rejects it at compile time.
//! - **Dyn**: `DynHandler` is object-safe. `TypedHandler<Args, H>` wraps a typed
//!   handler so the registry can keep `Arc<dyn DynHandler>` in one map.
//!
//! Going back from dyn to typed happens in `bind`, via the checked
//! `Any::downcast_ref`. The bucket key already pins the argument types, so the
//! downcast cannot fail in practice; if it ever did, the handler is skipped.
//!
//! # 学習ポイント
//! - マクロで `Fn(A1..An)` ごとに `Handler<(A1, .., An)>` を実装
//! - `PhantomData<fn(Args)>` で Args を保持しつつ Send/Sync を壊さない
//! - `self: Arc<Self>` の bind で handler 本体を複製せずに Job を作る

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use super::task::Job;
use crate::signature::{EventArgs, Signature};

/// Arguments of one emission, shared by every task of its fan-out group.
pub type ArgPack = Arc<dyn Any + Send + Sync>;

/// Handler receives one emission's arguments by value.
///
/// # Example
/// ```ignore
/// dispatcher.add_handler("moved", |id: u64, x: f32, y: f32| {
///     println!("{id} -> ({x}, {y})");
/// });
/// ```
pub trait Handler<Args>: Send + Sync + 'static {
    fn call(&self, args: Args);
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        impl<F, $($ty),*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) + Send + Sync + 'static,
        {
            #[allow(non_snake_case)]
            fn call(&self, ($($ty,)*): ($($ty,)*)) {
                (self)($($ty),*)
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);

/// DynHandler is the object-safe face of a registered handler.
pub trait DynHandler: Send + Sync {
    /// Bind one emission's arguments, producing a runnable job.
    ///
    /// Returns `None` when `args` is not this handler's argument type.
    fn bind(self: Arc<Self>, args: &ArgPack) -> Option<Box<dyn Job>>;

    fn signature(&self) -> Signature;
}

pub struct TypedHandler<Args, H> {
    handler: H,
    _marker: PhantomData<fn(Args)>,
}

impl<Args, H> TypedHandler<Args, H>
where
    Args: EventArgs,
    H: Handler<Args>,
{
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<Args, H> DynHandler for TypedHandler<Args, H>
where
    Args: EventArgs,
    H: Handler<Args>,
{
    fn bind(self: Arc<Self>, args: &ArgPack) -> Option<Box<dyn Job>> {
        let args = args.downcast_ref::<Args>()?.clone();
        Some(Box::new(BoundHandler {
            handler: self,
            args,
        }))
    }

    fn signature(&self) -> Signature {
        Signature::of::<Args>()
    }
}

/// A handler together with the arguments of one emission.
struct BoundHandler<Args, H> {
    handler: Arc<TypedHandler<Args, H>>,
    args: Args,
}

impl<Args, H> Job for BoundHandler<Args, H>
where
    Args: EventArgs,
    H: Handler<Args>,
{
    fn run(self: Box<Self>) {
        let BoundHandler { handler, args } = *self;
        handler.handler.call(args);
    }
}
