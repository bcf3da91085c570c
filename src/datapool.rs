//! Ordered sequence of DATA data with a rewindable read cursor.
//! Transcribed from `data.c`.

use crate::error::Error;

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum DatumType {
    Quoted,
    Unquoted,
}

#[derive(Clone, Copy, Debug)]
struct Datum {
    datum_type: DatumType,
    str_index: usize,
}

/// The program's DATA pool: every literal DATA item, in source order, as
/// a `(type, string-pool-index)` pair. Numeric data is stored in its
/// unquoted textual form and re-parsed at READ time by the data lexer.
pub struct DataPool {
    data: Vec<Datum>,
    cursor: usize,
}

impl DataPool {
    pub fn new() -> Self {
        DataPool { data: Vec::new(), cursor: 0 }
    }

    pub fn add(&mut self, str_index: usize, datum_type: DatumType) {
        self.data.push(Datum { datum_type, str_index });
    }

    pub fn restore(&mut self) {
        self.cursor = 0;
    }

    /// Reads the current element and advances the cursor. Past the end,
    /// returns `Error::IndexRange`, which the VM surfaces as READ overflow.
    pub fn read(&mut self) -> Result<(DatumType, usize), Error> {
        if self.cursor >= self.data.len() {
            return Err(Error::IndexRange);
        }
        let datum = self.data[self.cursor];
        self.cursor += 1;
        Ok((datum.datum_type, datum.str_index))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Every item in source order, for `basfile`'s `.basc` image writer.
    pub fn items(&self) -> Vec<(DatumType, usize)> {
        self.data.iter().map(|d| (d.datum_type, d.str_index)).collect()
    }

    /// Rebuilds a pool from a saved image, cursor at the start.
    pub fn from_items(items: Vec<(DatumType, usize)>) -> Self {
        let data = items
            .into_iter()
            .map(|(datum_type, str_index)| Datum { datum_type, str_index })
            .collect();
        DataPool { data, cursor: 0 }
    }
}

impl Default for DataPool {
    fn default() -> Self {
        DataPool::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_in_order() {
        let mut pool = DataPool::new();
        pool.add(1, DatumType::Unquoted);
        pool.add(2, DatumType::Quoted);
        assert_eq!(pool.read().unwrap(), (DatumType::Unquoted, 1));
        assert_eq!(pool.read().unwrap(), (DatumType::Quoted, 2));
    }

    #[test]
    fn read_past_end_is_index_range() {
        let mut pool = DataPool::new();
        pool.add(1, DatumType::Unquoted);
        pool.read().unwrap();
        assert_eq!(pool.read(), Err(Error::IndexRange));
    }

    #[test]
    fn restore_rewinds_cursor() {
        let mut pool = DataPool::new();
        pool.add(1, DatumType::Unquoted);
        pool.add(2, DatumType::Unquoted);
        pool.read().unwrap();
        pool.read().unwrap();
        pool.restore();
        assert_eq!(pool.read().unwrap(), (DatumType::Unquoted, 1));
    }
}
