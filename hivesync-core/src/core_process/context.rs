//! Per-process scratch space shared by the steps of one process
//!
//! Values are addressed through typed [`Slot`] handles. The first step to
//! produce into a slot owns it; a value is consumed exactly once, and a second
//! consume is reported instead of silently reading stale data.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard};

use super::errors::ContextError;

/// Owner recorded for values seeded before the process starts
pub const SEED_OWNER: &str = "seed";

/// Typed handle of one context slot
pub struct Slot<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Slot<T> {
    pub const fn new(name: &'static str) -> Self {
        Slot { name, _marker: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.name)
    }
}

enum SlotValue {
    Filled(Box<dyn Any + Send>),
    Consumed,
}

struct SlotEntry {
    owner: String,
    value: SlotValue,
}

/// Named values passed from producing steps to consuming steps
#[derive(Default)]
pub struct ProcessContext {
    slots: Mutex<HashMap<&'static str, SlotEntry>>,
}

impl ProcessContext {
    pub fn new() -> Self {
        ProcessContext::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<&'static str, SlotEntry>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Put an initial value in place before any step runs
    pub fn seed<T: Send + 'static>(&self, slot: Slot<T>, value: T) {
        self.lock().insert(
            slot.name,
            SlotEntry { owner: SEED_OWNER.to_string(), value: SlotValue::Filled(Box::new(value)) },
        );
    }

    /// Store `value`; only the slot's owner may overwrite it
    pub fn produce<T: Send + 'static>(&self, slot: Slot<T>, owner: &str, value: T) -> Result<(), ContextError> {
        let mut slots = self.lock();
        if let Some(existing) = slots.get(slot.name) {
            if existing.owner != owner {
                return Err(ContextError::NotOwner { slot: slot.name, owner: existing.owner.clone() });
            }
        }
        slots.insert(
            slot.name,
            SlotEntry { owner: owner.to_string(), value: SlotValue::Filled(Box::new(value)) },
        );
        Ok(())
    }

    /// Take the value out, leaving the slot marked consumed
    pub fn consume<T: Send + 'static>(&self, slot: Slot<T>) -> Result<T, ContextError> {
        let mut slots = self.lock();
        let entry = slots.get_mut(slot.name).ok_or(ContextError::Empty(slot.name))?;
        match &entry.value {
            SlotValue::Consumed => return Err(ContextError::AlreadyConsumed(slot.name)),
            SlotValue::Filled(value) if !value.is::<T>() => {
                return Err(ContextError::TypeMismatch(slot.name))
            }
            SlotValue::Filled(_) => {}
        }
        match std::mem::replace(&mut entry.value, SlotValue::Consumed) {
            SlotValue::Filled(value) => value
                .downcast::<T>()
                .map(|value| *value)
                .map_err(|_| ContextError::TypeMismatch(slot.name)),
            SlotValue::Consumed => Err(ContextError::AlreadyConsumed(slot.name)),
        }
    }

    /// Copy of the value, leaving it in place
    pub fn peek<T: Clone + Send + 'static>(&self, slot: Slot<T>) -> Result<T, ContextError> {
        let slots = self.lock();
        match slots.get(slot.name).map(|entry| &entry.value) {
            None => Err(ContextError::Empty(slot.name)),
            Some(SlotValue::Consumed) => Err(ContextError::AlreadyConsumed(slot.name)),
            Some(SlotValue::Filled(value)) => value
                .downcast_ref::<T>()
                .cloned()
                .ok_or(ContextError::TypeMismatch(slot.name)),
        }
    }

    /// True if the slot holds an unconsumed value
    pub fn contains<T>(&self, slot: Slot<T>) -> bool {
        matches!(
            self.lock().get(slot.name).map(|entry| &entry.value),
            Some(SlotValue::Filled(_))
        )
    }
}
