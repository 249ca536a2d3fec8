//! Host-side handles to native objects.
//!
//! A handle is what the host holds for a class instance. Cloning a handle
//! is another host reference to the same wrapper, not a copy of the object.
//! The ownership policy decides what releasing the wrapper does:
//!
//! | policy             | `destroy()` / last drop                         |
//! |--------------------|-------------------------------------------------|
//! | `OwnedByWrapper`   | destroys the object, exactly once               |
//! | `Borrowed`         | detaches; the object is never destroyed here    |
//! | `Shared`           | releases one holder; the last one destroys it   |

use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

use super::native::Ownership;
use super::value::NativeValue;
use crate::error::{ConversionError, RuntimeError};

/// A native class instance: its data members by name.
pub struct NativeObject {
    pub class: String,
    pub fields: IndexMap<SmolStr, NativeValue>,
    /// Incremented when the object is destroyed.
    destructions: Option<Arc<AtomicUsize>>,
}

impl NativeObject {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: IndexMap::new(),
            destructions: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<SmolStr>, value: NativeValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Count destructions of this object in `counter`.
    pub fn track_destruction(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.destructions = Some(counter);
        self
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        trace!(class = %self.class, "native object destroyed");
        if let Some(counter) = &self.destructions {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("class", &self.class)
            .field("fields", &self.fields)
            .finish()
    }
}

type Cell = Arc<Mutex<NativeObject>>;

enum Slot {
    Strong(Cell),
    Weak(Weak<Mutex<NativeObject>>),
    Released,
}

struct Wrapper {
    class: String,
    ownership: Ownership,
    slot: Mutex<Slot>,
}

/// A host reference to a native object.
#[derive(Clone)]
pub struct ObjectHandle(Arc<Wrapper>);

impl ObjectHandle {
    fn wrap(class: String, ownership: Ownership, slot: Slot) -> Self {
        Self(Arc::new(Wrapper {
            class,
            ownership,
            slot: Mutex::new(slot),
        }))
    }

    /// Take ownership of `object`.
    pub fn owned(object: NativeObject) -> Self {
        let class = object.class.clone();
        Self::wrap(
            class,
            Ownership::OwnedByWrapper,
            Slot::Strong(Arc::new(Mutex::new(object))),
        )
    }

    /// A reference-counted object with one holder.
    pub fn shared(object: NativeObject) -> Self {
        let class = object.class.clone();
        Self::wrap(class, Ownership::Shared, Slot::Strong(Arc::new(Mutex::new(object))))
    }

    /// A wrapper that refers to this handle's object without owning it.
    pub fn borrow(&self) -> ObjectHandle {
        let slot = match &*self.0.slot.lock() {
            Slot::Strong(cell) => Slot::Weak(Arc::downgrade(cell)),
            Slot::Weak(weak) => Slot::Weak(weak.clone()),
            Slot::Released => Slot::Released,
        };
        Self::wrap(self.0.class.clone(), Ownership::Borrowed, slot)
    }

    /// A new holder of a shared object. Fails for objects that are not
    /// reference counted.
    pub fn share(&self) -> Result<ObjectHandle, RuntimeError> {
        if self.0.ownership != Ownership::Shared {
            return Err(RuntimeError::Conversion(ConversionError::mismatch(
                format!("std::shared_ptr<{}>", self.0.class),
                format!("{} ({:?})", self.0.class, self.0.ownership),
            )));
        }
        match &*self.0.slot.lock() {
            Slot::Strong(cell) => Ok(Self::wrap(
                self.0.class.clone(),
                Ownership::Shared,
                Slot::Strong(cell.clone()),
            )),
            _ => Err(self.destroyed()),
        }
    }

    pub fn class(&self) -> &str {
        &self.0.class
    }

    pub fn ownership(&self) -> Ownership {
        self.0.ownership
    }

    /// Whether the object can still be reached through this handle.
    pub fn is_alive(&self) -> bool {
        match &*self.0.slot.lock() {
            Slot::Strong(_) => true,
            Slot::Weak(weak) => weak.strong_count() > 0,
            Slot::Released => false,
        }
    }

    /// Release the wrapper explicitly. Idempotent: later calls and the final
    /// drop do nothing more.
    pub fn destroy(&self) {
        let released = std::mem::replace(&mut *self.0.slot.lock(), Slot::Released);
        trace!(class = %self.0.class, ownership = ?self.0.ownership, "wrapper released");
        drop(released);
    }

    /// Run `f` on the object.
    pub fn with<R>(&self, f: impl FnOnce(&mut NativeObject) -> R) -> Result<R, RuntimeError> {
        let cell = match &*self.0.slot.lock() {
            Slot::Strong(cell) => cell.clone(),
            Slot::Weak(weak) => weak.upgrade().ok_or_else(|| self.destroyed())?,
            Slot::Released => return Err(self.destroyed()),
        };
        let mut object = cell.lock();
        Ok(f(&mut object))
    }

    /// Whether both handles reach the same native object.
    pub fn same_object(&self, other: &ObjectHandle) -> bool {
        match (self.cell(), other.cell()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    fn cell(&self) -> Option<Cell> {
        match &*self.0.slot.lock() {
            Slot::Strong(cell) => Some(cell.clone()),
            Slot::Weak(weak) => weak.upgrade(),
            Slot::Released => None,
        }
    }

    fn destroyed(&self) -> RuntimeError {
        RuntimeError::Destroyed {
            class: self.0.class.clone(),
        }
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.same_object(other)
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("class", &self.0.class)
            .field("ownership", &self.0.ownership)
            .field("alive", &self.is_alive())
            .finish()
    }
}
