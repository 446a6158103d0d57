//! # TagTable
//!
//! Both the outbound correlation table (tag -> outstanding Action) and the
//! reassembler's inbound table (tag -> partial Message) are fixed 8-slot
//! arrays, per DSP0236's 3-bit tag field. Modeled as a fixed array of
//! `Option<T>`, never raw pointers (Design Notes §9).

/// Number of distinct tag values (`MCTP_NUM_TAGS`).
pub const NUM_TAGS: usize = 8;

#[derive(Debug)]
pub struct TagTable<T> {
    slots: [Option<T>; NUM_TAGS],
}

impl<T> Default for TagTable<T> {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl<T> TagTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: u8) -> Option<&T> {
        self.slots[tag as usize & (NUM_TAGS - 1)].as_ref()
    }

    pub fn take(&mut self, tag: u8) -> Option<T> {
        self.slots[tag as usize & (NUM_TAGS - 1)].take()
    }

    pub fn is_occupied(&self, tag: u8) -> bool {
        self.slots[tag as usize & (NUM_TAGS - 1)].is_some()
    }

    /// Install `value` in `tag`'s slot, returning whatever was there before
    /// (should always be `None` for correct callers).
    pub fn install(&mut self, tag: u8, value: T) -> Option<T> {
        self.slots[tag as usize & (NUM_TAGS - 1)].replace(value)
    }

    /// First free slot index, if any.
    pub fn first_free(&self) -> Option<u8> {
        self.slots.iter().position(Option::is_none).map(|i| i as u8)
    }

    /// Iterate over occupied slots as `(tag, &T)`.
    pub fn iter_occupied(&self) -> impl Iterator<Item = (u8, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i as u8, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_and_retrieves_by_tag() {
        let mut t: TagTable<u32> = TagTable::new();
        assert_eq!(t.first_free(), Some(0));
        t.install(3, 42);
        assert_eq!(t.get(3), Some(&42));
        assert!(t.is_occupied(3));
        assert_eq!(t.take(3), Some(42));
        assert!(!t.is_occupied(3));
    }

    #[test]
    fn first_free_is_none_when_all_occupied() {
        let mut t: TagTable<u32> = TagTable::new();
        for tag in 0..NUM_TAGS as u8 {
            t.install(tag, tag as u32);
        }
        assert_eq!(t.first_free(), None);
    }
}
