//!
//! Runtime Value Representation
//!
//! Every value that crosses a thread or timer boundary is an `Object`: an
//! atomically reference-counted, type-erased handle. Thread payloads, thread
//! return values, thread-local slot values and timer arguments all use it.
//!
//! The library never looks inside an `Object`; it only clones, stores and
//! drops the handle. Callers recover the concrete type with `downcast`.
//!

use std::any::Any;
use std::sync::Arc;

/// Opaque shared value
pub type Object = Arc<dyn Any + Send + Sync>;

/// Wrap a value into an `Object`
pub fn object<T: Any + Send + Sync>(value: T) -> Object {
    Arc::new(value)
}

/// Borrow the concrete value behind an `Object`, if it has type `T`
pub fn downcast<T: Any>(object: &Object) -> Option<&T> {
    object.as_ref().downcast_ref::<T>()
}

/// Whether two optional objects are the same handle (or both null)
pub fn same_object(a: Option<&Object>, b: Option<&Object>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_downcast() {
        let o = object(String::from("x"));
        assert_eq!(downcast::<String>(&o).map(String::as_str), Some("x"));
        assert!(downcast::<i64>(&o).is_none());
    }

    #[test]
    fn test_same_object() {
        let a = object(1_i64);
        let b = object(1_i64);
        assert!(same_object(Some(&a), Some(&a.clone())));
        assert!(!same_object(Some(&a), Some(&b)));
        assert!(same_object(None, None));
        assert!(!same_object(Some(&a), None));
    }
}
