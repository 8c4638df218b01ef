#![expect(unsafe_code, reason = "raw reads of a foreign object's vtable")]

//! Positional vtable resolution.
//!
//! This is the only place that dereferences a SpoutLibrary instance pointer.
//! [`resolve`] reads the table address from the first word of the object,
//! indexes it by the slot's position and reinterprets the entry with the
//! slot's declared signature.
//!
//! Null pointers at any step are reported as [`ResolveFailure`]. A non-null
//! but bogus instance pointer is not detectable here and will fault.

use std::os::raw::c_void;

use tracing::{error, trace};

use super::{
    error::ResolveFailure,
    ffi_types::{Slot, SpoutInstance, SLOT_COUNT},
};

/// Resolve slot `S` of `instance` into a callable function pointer.
///
/// # Safety
///
/// A non-null `instance` must point to a live object whose first word is the
/// address of a table with at least `S::INDEX + 1` entries, and the entry at
/// `S::INDEX` must have the signature `S::Fn`.
pub unsafe fn resolve<S: Slot>(instance: *mut SpoutInstance) -> Result<S::Fn, ResolveFailure> {
    let raw = unsafe { read_entry::<S>(instance) }?;
    Ok(unsafe { S::from_raw(raw) })
}

/// Raw table entry for slot `S`. Every lookup, cached or not, comes through here.
unsafe fn read_entry<S: Slot>(
    instance: *mut SpoutInstance,
) -> Result<*const c_void, ResolveFailure> {
    let entry = unsafe { read_slot(instance, S::INDEX) };
    if let Err(reason) = entry {
        error!("Failed to resolve vtable slot {} ({}): {reason}", S::INDEX, S::NAME);
    }
    entry
}

unsafe fn read_slot(
    instance: *mut SpoutInstance,
    index: usize,
) -> Result<*const c_void, ResolveFailure> {
    if instance.is_null() {
        return Err(ResolveFailure::NullInstance);
    }
    let table = unsafe { *(instance as *const *const *const c_void) };
    if table.is_null() {
        return Err(ResolveFailure::NullTable);
    }
    let entry = unsafe { *table.add(index) };
    if entry.is_null() {
        return Err(ResolveFailure::EmptySlot);
    }
    trace!("vtable {table:p}[{index}] -> {entry:p}");
    Ok(entry)
}

/// Resolution results for one instance.
///
/// Entries are keyed by slot index and tied to the instance they were read
/// from. Binding a different instance, or calling [`invalidate`], drops them.
/// Failed lookups are kept too, so a missing slot is reported once rather
/// than on every frame.
///
/// [`invalidate`]: SlotCache::invalidate
#[derive(Debug)]
pub struct SlotCache {
    instance: *mut SpoutInstance,
    entries: [Option<Result<*const c_void, ResolveFailure>>; SLOT_COUNT],
}

impl Default for SlotCache {
    fn default() -> Self {
        Self {
            instance: std::ptr::null_mut(),
            entries: [None; SLOT_COUNT],
        }
    }
}

impl SlotCache {
    /// Tie the cache to `instance`, clearing it if it held another one.
    pub fn bind(&mut self, instance: *mut SpoutInstance) {
        if self.instance != instance {
            self.entries = [None; SLOT_COUNT];
            self.instance = instance;
        }
    }

    /// Forget every cached entry and the bound instance.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    /// Number of slots resolved to a callable.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| matches!(e, Some(Ok(_)))).count()
    }

    /// True when no lookup, successful or not, is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Return slot `S` for the bound instance, resolving it on first use.
    ///
    /// # Safety
    ///
    /// Same contract as [`resolve`] for the bound instance.
    pub unsafe fn get<S: Slot>(&mut self) -> Result<S::Fn, ResolveFailure> {
        let Some(entry) = self.entries.get_mut(S::INDEX) else {
            // Slots past the bound table are not cached.
            return unsafe { resolve::<S>(self.instance) };
        };
        let raw = match *entry {
            Some(cached) => cached?,
            None => {
                let looked_up = unsafe { read_entry::<S>(self.instance) };
                if looked_up != Err(ResolveFailure::NullInstance) {
                    *entry = Some(looked_up);
                }
                looked_up?
            }
        };
        Ok(unsafe { S::from_raw(raw) })
    }
}
