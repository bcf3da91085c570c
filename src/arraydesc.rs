//! Array descriptors: one per letter, filled by the compiler and consulted
//! by the VM for every list/table access. Transcribed from `arraydsc.c`.

use crate::N_VARNAMES;

/// Base RAM offset and dimensions of the array bound to one letter. A
/// `dim2` of 0 means the letter has no second dimension (it is a list, not
/// a table, or not yet an array at all).
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct ArrayDesc {
    pub rampos: i32,
    pub dim1: i32,
    pub dim2: i32,
}

impl ArrayDesc {
    pub fn is_table(self) -> bool {
        self.dim2 > 0
    }
}

/// The 26-entry array descriptor table, indexed by letter (`A` = 0).
#[derive(Clone, Debug)]
pub struct ArrayDescs([ArrayDesc; N_VARNAMES]);

impl ArrayDescs {
    pub fn new() -> Self {
        ArrayDescs([ArrayDesc::default(); N_VARNAMES])
    }

    pub fn reset(&mut self) {
        self.0 = [ArrayDesc::default(); N_VARNAMES];
    }

    pub fn get(&self, index1: usize) -> ArrayDesc {
        self.0[index1]
    }

    pub fn set(&mut self, index1: usize, rampos: i32, dim1: i32, dim2: i32) {
        self.0[index1] = ArrayDesc { rampos, dim1, dim2 };
    }
}

impl Default for ArrayDescs {
    fn default() -> Self {
        ArrayDescs::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_table_is_all_zero() {
        let descs = ArrayDescs::new();
        for i in 0..N_VARNAMES {
            assert_eq!(descs.get(i), ArrayDesc::default());
        }
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut descs = ArrayDescs::new();
        descs.set(0, 100, 11, 0);
        let d = descs.get(0);
        assert_eq!(d.rampos, 100);
        assert_eq!(d.dim1, 11);
        assert!(!d.is_table());
    }

    #[test]
    fn table_has_nonzero_dim2() {
        let mut descs = ArrayDescs::new();
        descs.set(1, 0, 5, 5);
        assert!(descs.get(1).is_table());
    }

    #[test]
    fn reset_clears_all_entries() {
        let mut descs = ArrayDescs::new();
        descs.set(3, 50, 10, 10);
        descs.reset();
        assert_eq!(descs.get(3), ArrayDesc::default());
    }
}
