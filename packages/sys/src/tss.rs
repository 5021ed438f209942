//! Thread-specific storage keys.
//!
//! A fixed pool of 64 keys shared by the process. Each thread holds one
//! opaque word per key; when the thread exits, the destructor registered
//! for a key runs once for every non-zero value that thread still holds.

use std::cell::RefCell;
use std::sync::Mutex;

use crate::errno::Errno;

/// Number of keys available to the process.
pub const TSS_KEYS_MAX: usize = 64;

/// Destructor run at thread exit with the thread's value for a key.
pub type Destructor = fn(usize);

struct KeyTable {
    allocated: u64,
    generations: [u32; TSS_KEYS_MAX],
    destructors: [Option<Destructor>; TSS_KEYS_MAX],
}

impl KeyTable {
    fn is_live(&self, index: usize, generation: u32) -> bool {
        self.allocated & (1u64 << index) != 0 && self.generations[index] == generation
    }
}

lazy_static::lazy_static! {
    static ref KEYS: Mutex<KeyTable> = Mutex::new(KeyTable {
        allocated: 0,
        generations: [0; TSS_KEYS_MAX],
        destructors: [None; TSS_KEYS_MAX],
    });
}

fn keys() -> std::sync::MutexGuard<'static, KeyTable> {
    KEYS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Per-thread values, tagged with the key generation they were set under
/// so a recycled key never exposes a stale value.
struct ThreadSlots {
    values: RefCell<[(u32, usize); TSS_KEYS_MAX]>,
}

impl Drop for ThreadSlots {
    fn drop(&mut self) {
        let values = *self.values.get_mut();
        let pending: Vec<(Destructor, usize)> = {
            let table = keys();
            values
                .iter()
                .enumerate()
                .filter(|(index, (generation, value))| {
                    *value != 0 && table.is_live(*index, *generation)
                })
                .filter_map(|(index, (_, value))| {
                    table.destructors[index].map(|destructor| (destructor, *value))
                })
                .collect()
        };

        for (destructor, value) in pending {
            destructor(value);
        }
    }
}

thread_local! {
    static SLOTS: ThreadSlots = const {
        ThreadSlots {
            values: RefCell::new([(0, 0); TSS_KEYS_MAX]),
        }
    };
}

/// A thread-specific storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TssKey {
    index: u32,
    generation: u32,
}

impl TssKey {
    /// Allocate the lowest free key.
    ///
    /// Fails with `EAGAIN` once all keys are in use.
    pub fn create(destructor: Option<Destructor>) -> Result<Self, Errno> {
        let mut table = keys();
        if table.allocated == u64::MAX {
            return Err(Errno::EAGAIN);
        }

        let index = (!table.allocated).trailing_zeros() as usize;
        table.allocated |= 1u64 << index;
        table.generations[index] = table.generations[index].wrapping_add(1);
        table.destructors[index] = destructor;

        Ok(TssKey {
            index: index as u32,
            generation: table.generations[index],
        })
    }

    /// Slot number of this key.
    pub fn index(self) -> u32 {
        self.index
    }

    /// The calling thread's value, or 0 when unset or the key is deleted.
    pub fn get(self) -> usize {
        if !self.is_live() {
            return 0;
        }
        SLOTS
            .try_with(|slots| {
                let (generation, value) = slots.values.borrow()[self.index as usize];
                if generation == self.generation {
                    value
                } else {
                    0
                }
            })
            .unwrap_or(0)
    }

    /// Store a value for the calling thread.
    pub fn set(self, value: usize) -> Result<(), Errno> {
        if !self.is_live() {
            return Err(Errno::EINVAL);
        }
        SLOTS
            .try_with(|slots| {
                slots.values.borrow_mut()[self.index as usize] = (self.generation, value);
            })
            .map_err(|_| Errno::EINVAL)
    }

    /// Release the key. Destructors do not run for values still held.
    pub fn delete(self) -> Result<(), Errno> {
        let mut table = keys();
        if !table.is_live(self.index as usize, self.generation) {
            return Err(Errno::EINVAL);
        }
        table.allocated &= !(1u64 << self.index);
        table.destructors[self.index as usize] = None;
        Ok(())
    }

    fn is_live(self) -> bool {
        keys().is_live(self.index as usize, self.generation)
    }
}
