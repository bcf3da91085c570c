//! Interned, reference-counted string storage for program literals and
//! run-time input strings. Transcribed from `str.c`.

use crate::error::Error;
use crate::N_VARNAMES;

struct Slot {
    text: String,
    count: u32,
}

/// The program's string pool. Slot 0 is always the empty string.
/// `intern` returns the index of an existing equal string, or fills the
/// first freed slot, or appends.
pub struct StringPool {
    slots: Vec<Option<Slot>>,
    n_const: usize,
}

impl StringPool {
    /// A fresh pool with only the empty string at slot 0 and refcount 0
    /// (nothing references it yet; `reset` is what assigns the "every
    /// string variable starts empty" refcount).
    pub fn new() -> Self {
        StringPool {
            slots: vec![Some(Slot { text: String::new(), count: 0 })],
            n_const: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> &str {
        self.slots[index]
            .as_ref()
            .map(|s| s.text.as_str())
            .unwrap_or("")
    }

    /// Returns the index of `text`, reusing an equal existing slot if one
    /// exists, otherwise a freed slot or a new one at the end.
    pub fn intern(&mut self, text: &str) -> Result<usize, Error> {
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(s) = slot {
                if s.text == text {
                    return Ok(i);
                }
            }
        }

        if let Some(i) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[i] = Some(Slot { text: text.to_string(), count: 0 });
            return Ok(i);
        }

        self.slots.push(Some(Slot { text: text.to_string(), count: 0 }));
        Ok(self.slots.len() - 1)
    }

    pub fn inc_refcount(&mut self, index: usize) {
        if let Some(s) = self.slots[index].as_mut() {
            s.count += 1;
        }
    }

    /// Decrements the refcount of `index`; when it reaches zero the slot
    /// is freed (unless it is slot 0, which the reset lifecycle always
    /// repopulates explicitly rather than via refcount bookkeeping).
    pub fn dec_refcount(&mut self, index: usize) {
        let free_it = if let Some(s) = self.slots[index].as_mut() {
            s.count = s.count.saturating_sub(1);
            s.count == 0
        } else {
            false
        };
        if free_it {
            self.slots[index] = None;
        }
    }

    pub fn set_refcount(&mut self, index: usize, count: u32) {
        if let Some(s) = self.slots[index].as_mut() {
            s.count = count;
        }
    }

    /// Freezes the current slot count as constants: everything interned up
    /// to this point survives `reset`.
    pub fn mark_constants(&mut self) {
        self.n_const = self.slots.len();
    }

    /// How many leading slots are constants, for `basfile`'s `.basc` image
    /// writer (it needs to know the boundary so a loaded image can still
    /// `reset()` correctly before every `RUN`).
    pub fn n_const(&self) -> usize {
        self.n_const
    }

    /// The text of every slot, in slot order, including freed ones (as
    /// empty strings) so indices line up 1:1 with a saved `.basc` image.
    pub fn texts(&self) -> Vec<&str> {
        self.slots
            .iter()
            .map(|s| s.as_ref().map(|s| s.text.as_str()).unwrap_or(""))
            .collect()
    }

    /// Rebuilds a pool from a saved image: `texts[..n_const]` are the
    /// constants, anything past that is non-constant scratch that `reset`
    /// will discard on the first `RUN` anyway. Refcounts are left at zero;
    /// `CompiledProgram::run` calls `reset()` before every execution, which
    /// sets them properly.
    pub fn from_texts(texts: Vec<String>, n_const: usize) -> Self {
        let slots = texts
            .into_iter()
            .map(|text| Some(Slot { text, count: 0 }))
            .collect();
        StringPool { slots, n_const }
    }

    /// Before each RUN: frees every non-constant slot, resets constant
    /// refcounts to 1, and sets slot 0's refcount to `N_VARNAMES + 1`
    /// (every string variable starts out holding the empty string, plus
    /// one for the pool's own reference to it).
    pub fn reset(&mut self) {
        self.slots.truncate(self.n_const.max(1));
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(s) = slot {
                s.count = if i == 0 { N_VARNAMES as u32 + 1 } else { 1 };
            }
        }
    }
}

impl Default for StringPool {
    fn default() -> Self {
        StringPool::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_pool_has_empty_string_at_zero() {
        let pool = StringPool::new();
        assert_eq!(pool.get(0), "");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn intern_dedupes_equal_strings() {
        let mut pool = StringPool::new();
        let a = pool.intern("HELLO").unwrap();
        let b = pool.intern("HELLO").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.get(a), "HELLO");
    }

    #[test]
    fn intern_distinct_strings_get_distinct_slots() {
        let mut pool = StringPool::new();
        let a = pool.intern("AB").unwrap();
        let b = pool.intern("CD").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn dec_refcount_frees_and_reuses_slot() {
        let mut pool = StringPool::new();
        let a = pool.intern("X").unwrap();
        pool.inc_refcount(a);
        pool.dec_refcount(a);
        // slot freed; a new distinct string should reuse it rather than
        // growing the pool.
        let before = pool.len();
        let b = pool.intern("Y").unwrap();
        assert_eq!(b, a);
        assert_eq!(pool.len(), before);
    }

    #[test]
    fn reset_keeps_constants_and_frees_the_rest() {
        let mut pool = StringPool::new();
        pool.intern("CONST").unwrap();
        pool.mark_constants();
        pool.intern("RUNTIME").unwrap();
        assert_eq!(pool.len(), 3);

        pool.reset();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(0), "");
        assert_eq!(pool.get(1), "CONST");
    }

    #[test]
    fn reset_sets_empty_slot_refcount_to_nvarnames_plus_one() {
        let mut pool = StringPool::new();
        pool.mark_constants();
        pool.reset();
        // N_VARNAMES variables can each move away from "", one decrement
        // apiece; the extra +1 in the initial count is a buffer that keeps
        // slot 0 alive even if every variable reassigns.
        for _ in 0..N_VARNAMES {
            pool.dec_refcount(0);
        }
        assert_eq!(pool.get(0), "");
    }
}
