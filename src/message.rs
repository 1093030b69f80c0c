//! Opaque payloads carried between stages.
//!
//! A [`Payload`] is a shared, type-erased value: `Arc<dyn Any + Send + Sync>`.
//! `Any::type_id()` already *is* the "tagged discriminator for downcast" the
//! design calls for, so no hand-rolled tag field is needed — the same value
//! can be handed to several consumer ids without copying, and whichever one
//! drains the last pending id is the one that drops the last `Arc` clone.

use std::any::Any;
use std::sync::Arc;

/// The type-erased value moved between stages.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Wraps a concrete, `'static` value into a [`Payload`].
pub fn wrap<T: Any + Send + Sync>(value: T) -> Payload {
    Arc::new(value)
}

/// Attempts to view a [`Payload`] as a concrete `T`, without consuming it.
///
/// Used by the typed façade (see [`crate::typed`]) to downcast an incoming
/// message; a failed downcast is not an error, it is the "skip" signal a
/// transformer or consumer must tolerate.
pub fn downcast_ref<T: Any>(payload: &Payload) -> Option<&T> {
    payload.downcast_ref::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
    }

    #[test]
    fn round_trips_through_downcast() {
        let payload = wrap(Point { x: 1.0, y: 2.0 });
        assert_eq!(downcast_ref::<Point>(&payload), Some(&Point { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn mismatched_downcast_yields_none() {
        let payload = wrap(42i32);
        assert_eq!(downcast_ref::<Point>(&payload), None);
    }

    #[test]
    fn clones_share_the_same_allocation() {
        let payload = wrap(String::from("hello"));
        let clone = Arc::clone(&payload);
        assert_eq!(
            downcast_ref::<String>(&payload),
            downcast_ref::<String>(&clone)
        );
    }
}
