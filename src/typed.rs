//! Typed façade over the type-erased [`Payload`] callbacks.
//!
//! Grounded in `examples/original_source/include/pipeline_system.h`'s
//! `producer_function`/`transform_function`/`consume_function` helpers,
//! which wrap a concrete-typed callback so the pipeline's stored callback
//! signature stays uniform. Here that uniform signature is
//! `FnMut(Payload) -> Option<Payload>` (or the producer/consumer variants);
//! a downcast mismatch is treated the same as any other skip, never an
//! error.

use std::any::Any;

use crate::message::{downcast_ref, wrap, Payload};

/// Wraps a producer closure returning a concrete `T` into the type-erased
/// signature `spawn_producer` expects.
pub fn typed_producer<T>(mut callback: impl FnMut() -> Option<T> + Send + 'static) -> impl FnMut() -> Option<Payload> + Send + 'static
where
    T: Any + Send + Sync,
{
    move || callback().map(wrap)
}

/// Wraps a transformer closure over concrete types `I -> Option<O>` into
/// the type-erased signature `spawn_transformer` expects. An incoming
/// payload that isn't an `I` is skipped, exactly like a callback that
/// itself returned `None`.
pub fn typed_transformer<I, O>(
    mut callback: impl FnMut(&I) -> Option<O> + Send + 'static,
) -> impl FnMut(Payload) -> Option<Payload> + Send + 'static
where
    I: Any + Send + Sync,
    O: Any + Send + Sync,
{
    move |payload: Payload| {
        let input = downcast_ref::<I>(&payload)?;
        callback(input).map(wrap)
    }
}

/// Wraps a consumer closure over a concrete `I` into the type-erased
/// signature `spawn_consumer` expects. A payload that isn't an `I` is
/// silently dropped.
pub fn typed_consumer<I>(mut callback: impl FnMut(&I) + Send + 'static) -> impl FnMut(Payload) + Send + 'static
where
    I: Any + Send + Sync,
{
    move |payload: Payload| {
        if let Some(input) = downcast_ref::<I>(&payload) {
            callback(input);
        }
    }
}
