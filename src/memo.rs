//! Memo tables: insertion-ordered maps from observed values to dense indices.
//!
//! Both tables share one open-addressed hash index over `i32` slots. A slot holds
//! the dense index of a memoized value, or [`EMPTY_SLOT`]. Probing is linear from
//! `hash & (capacity - 1)`, and the slot array doubles once it is more than 70%
//! occupied, rehashing every occupied slot against the new mask.
//!
//! Values themselves live outside the index, in insertion order: a vector of
//! elements for fixed-width keys, or an offsets vector and byte store for
//! variable-length keys.
//!
//! A table built with a pool charges the slots and value storage against it before
//! they grow, so an insertion the pool refuses fails with `OutOfMemory` and leaves
//! the table unchanged.

use std::hash::BuildHasher;

use ahash::RandomState;

use crate::buffer::{PoolRef, Reservation};
use crate::common::HeapSize;
use crate::error::{Error, Result};
use crate::native::NativeType;

/// The marker for an unoccupied slot.
pub const EMPTY_SLOT: i32 = i32::MAX;
/// The slot count used when none is requested.
pub const DEFAULT_CAPACITY: usize = 1024;
const MAX_LOAD_FACTOR: f64 = 0.7;
const SLOT_BYTES: usize = std::mem::size_of::<i32>();

/// The capacity a vector of `capacity` elements grows to when it must hold `needed`.
#[inline]
fn grown_capacity(capacity: usize, needed: usize) -> usize {
    if needed <= capacity {
        capacity
    } else {
        std::cmp::max(needed, std::cmp::max(capacity * 2, 8))
    }
}

/// Operations shared by the memo tables.
pub trait MemoTable {
    /// The key type accepted by lookups, possibly borrowed.
    type Value<'a>;

    /// The dense index of `value`, if it has been memoized.
    fn get(&self, value: Self::Value<'_>) -> Option<i32>;

    /// The dense index of `value`, memoizing it first if it is new.
    ///
    /// `on_found` receives the index of a value already present. `on_not_found` receives
    /// the index about to be assigned; if it returns an error, nothing is inserted and the
    /// error is returned.
    fn get_or_insert<F, N>(&mut self, value: Self::Value<'_>, on_found: F, on_not_found: N) -> Result<i32>
    where
        F: FnOnce(i32),
        N: FnOnce(i32) -> Result<()>;

    /// The number of distinct values memoized.
    fn size(&self) -> usize;

    /// Empties the table, releasing its storage.
    fn reset(&mut self);
}

/// The slot array and hasher shared by the memo tables.
#[derive(Debug)]
struct HashIndex {
    slots: Vec<i32>,
    state: RandomState,
    /// When false, a resize is refused with `Capacity`.
    allow_growth: bool,
}

impl HashIndex {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = std::cmp::max(capacity, 8).next_power_of_two();
        // Fixed seeds keep slot placement reproducible from run to run.
        let state = RandomState::with_seeds(0x243F_6A88_85A3_08D3, 0x1319_8A2E_0370_7344, 0xA409_3822_299F_31D0, 0x082E_FA98_EC4E_6C89);
        Self { slots: vec![EMPTY_SLOT; capacity], state, allow_growth: true }
    }

    #[inline(always)]
    fn hash(&self, bytes: &[u8]) -> u64 { self.state.hash_one(bytes) }

    #[inline(always)]
    fn mask(&self) -> usize { self.slots.len() - 1 }

    /// Probes for `hash`, returning the slot position and the index found there, if
    /// `matches` accepted it. An unmatched probe ends at an empty slot.
    #[inline]
    fn probe(&self, hash: u64, mut matches: impl FnMut(i32) -> bool) -> (usize, Option<i32>) {
        let mask = self.mask();
        let mut position = hash as usize & mask;
        loop {
            let index = self.slots[position];
            if index == EMPTY_SLOT {
                return (position, None);
            }
            if matches(index) {
                return (position, Some(index));
            }
            position = (position + 1) & mask;
        }
    }

    /// Fails if inserting one more value would need a resize that is not allowed.
    fn check_insert(&self, size: usize) -> Result<()> {
        if !self.allow_growth && self.needs_resize(size + 1) {
            return Err(Error::capacity(format!("memo table of {} slots cannot grow past {} values", self.slots.len(), size)));
        }
        if size >= EMPTY_SLOT as usize {
            return Err(Error::capacity("memo table holds the maximum number of values"));
        }
        Ok(())
    }

    #[inline(always)]
    fn needs_resize(&self, size: usize) -> bool {
        size as f64 > self.slots.len() as f64 * MAX_LOAD_FACTOR
    }

    /// The slot count once the table holds `size` values.
    #[inline]
    fn slots_for(&self, size: usize) -> usize {
        if self.needs_resize(size) { self.slots.len() * 2 } else { self.slots.len() }
    }

    /// A slot array of twice the capacity, placing each of the `size` indices by `hash_of`.
    fn grown(&self, size: usize, hash_of: impl Fn(i32) -> u64) -> Vec<i32> {
        let capacity = self.slots.len() * 2;
        tracing::debug!(old_capacity = self.slots.len(), new_capacity = capacity, size, "resizing memo table");
        let mut slots = vec![EMPTY_SLOT; capacity];
        let mask = capacity - 1;
        for index in 0 .. size as i32 {
            let mut position = hash_of(index) as usize & mask;
            while slots[position] != EMPTY_SLOT {
                position = (position + 1) & mask;
            }
            slots[position] = index;
        }
        slots
    }

    fn reset(&mut self, capacity: usize) {
        self.slots = vec![EMPTY_SLOT; std::cmp::max(capacity, 8).next_power_of_two()];
    }
}

/// Memoizes fixed-width values, compared and hashed by their bytes.
///
/// Floating point keys therefore treat each `NaN` bit pattern as one value, and
/// `0.0` and `-0.0` as two.
#[derive(Debug)]
pub struct ScalarMemoTable<T: NativeType> {
    index: HashIndex,
    values: Vec<T>,
    initial_capacity: usize,
    reservation: Reservation,
}

impl<T: NativeType> Default for ScalarMemoTable<T> {
    fn default() -> Self { Self::with_capacity(DEFAULT_CAPACITY) }
}

impl<T: NativeType> ScalarMemoTable<T> {
    /// A table with room for `capacity` slots, rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashIndex::with_capacity(capacity),
            values: Vec::new(),
            initial_capacity: capacity,
            reservation: Reservation::unaccounted(),
        }
    }

    /// A table whose storage is charged to `pool`.
    pub fn with_pool(capacity: usize, pool: &PoolRef) -> Result<Self> {
        let mut table = Self::with_capacity(capacity);
        let bytes = table.footprint(table.capacity(), 0);
        table.reservation = Reservation::new(pool);
        table.reservation.resize(bytes)?;
        Ok(table)
    }

    fn footprint(&self, slots: usize, values: usize) -> usize {
        slots * SLOT_BYTES + values * std::mem::size_of::<T>()
    }

    /// Whether the slot array may grow; when it may not, an insertion needing it fails with `Capacity`.
    pub fn set_allow_growth(&mut self, allow: bool) { self.index.allow_growth = allow; }

    /// The number of slots.
    pub fn capacity(&self) -> usize { self.index.slots.len() }

    /// The value with dense index `index`.
    pub fn value(&self, index: i32) -> T { self.values[index as usize] }

    /// The memoized values in insertion order.
    pub fn values(&self) -> &[T] { &self.values }

    /// Copies the values with indices `start..` into `out`.
    pub fn copy_values(&self, start: usize, out: &mut [T]) {
        let values = &self.values[start ..];
        out[.. values.len()].copy_from_slice(values);
    }

    /// Calls `visitor` on each value with index `start..`, in order.
    pub fn visit_values(&self, start: usize, mut visitor: impl FnMut(T)) {
        for value in &self.values[start ..] {
            visitor(*value);
        }
    }
}

impl<T: NativeType> MemoTable for ScalarMemoTable<T> {
    type Value<'a> = T;

    fn get(&self, value: T) -> Option<i32> {
        let bytes = bytemuck::bytes_of(&value);
        let values = &self.values;
        self.index.probe(self.index.hash(bytes), |index| bytemuck::bytes_of(&values[index as usize]) == bytes).1
    }

    fn get_or_insert<F, N>(&mut self, value: T, on_found: F, on_not_found: N) -> Result<i32>
    where
        F: FnOnce(i32),
        N: FnOnce(i32) -> Result<()>,
    {
        let bytes = bytemuck::bytes_of(&value);
        let hash = self.index.hash(bytes);
        let values = &self.values;
        let (position, found) = self.index.probe(hash, |index| bytemuck::bytes_of(&values[index as usize]) == bytes);
        if let Some(index) = found {
            on_found(index);
            return Ok(index);
        }

        let len = self.values.len();
        let index = len as i32;
        self.index.check_insert(len)?;
        let values_capacity = grown_capacity(self.values.capacity(), len + 1);
        let bytes = self.footprint(self.index.slots_for(len + 1), values_capacity);
        let charged = self.reservation.size();
        self.reservation.resize(bytes)?;
        if let Err(err) = on_not_found(index) {
            self.reservation.shrink_to(charged);
            return Err(err);
        }
        self.values.reserve_exact(values_capacity - len);
        self.index.slots[position] = index;
        self.values.push(value);
        if self.index.needs_resize(self.values.len()) {
            let values = &self.values;
            let slots = self.index.grown(values.len(), |index| self.index.hash(bytemuck::bytes_of(&values[index as usize])));
            self.index.slots = slots;
        }
        Ok(index)
    }

    fn size(&self) -> usize { self.values.len() }

    fn reset(&mut self) {
        self.index.reset(self.initial_capacity);
        self.values = Vec::new();
        let bytes = self.footprint(self.capacity(), 0);
        self.reservation.shrink_to(bytes);
    }
}

impl<T: NativeType + HeapSize> HeapSize for ScalarMemoTable<T> {
    fn heap_size(&self) -> (usize, usize) {
        let (l0, c0) = self.index.slots.heap_size();
        let (l1, c1) = self.values.heap_size();
        (l0 + l1, c0 + c1)
    }
}

/// Memoizes byte strings in a contiguous store, compared byte-wise.
#[derive(Debug)]
pub struct BinaryMemoTable {
    index: HashIndex,
    /// Offsets container; value `i` spans `offsets[i] .. offsets[i + 1]`.
    offsets: Vec<i32>,
    /// Values container; the concatenated bytes of every value.
    data: Vec<u8>,
    initial_capacity: usize,
    reservation: Reservation,
}

impl Default for BinaryMemoTable {
    fn default() -> Self { Self::with_capacity(DEFAULT_CAPACITY) }
}

impl BinaryMemoTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashIndex::with_capacity(capacity),
            offsets: vec![0],
            data: Vec::new(),
            initial_capacity: capacity,
            reservation: Reservation::unaccounted(),
        }
    }

    /// A table whose storage is charged to `pool`.
    pub fn with_pool(capacity: usize, pool: &PoolRef) -> Result<Self> {
        let mut table = Self::with_capacity(capacity);
        let bytes = Self::footprint(table.capacity(), table.offsets.capacity(), 0);
        table.reservation = Reservation::new(pool);
        table.reservation.resize(bytes)?;
        Ok(table)
    }

    fn footprint(slots: usize, offsets: usize, data: usize) -> usize {
        (slots + offsets) * SLOT_BYTES + data
    }

    pub fn set_allow_growth(&mut self, allow: bool) { self.index.allow_growth = allow; }

    pub fn capacity(&self) -> usize { self.index.slots.len() }

    pub fn value(&self, index: i32) -> &[u8] {
        let index = index as usize;
        &self.data[self.offsets[index] as usize .. self.offsets[index + 1] as usize]
    }

    /// Total bytes of all memoized values.
    pub fn values_size(&self) -> usize { self.data.len() }

    /// The offsets of values `start..`, rebased so the first is zero.
    ///
    /// `out` receives `size() - start + 1` entries.
    pub fn copy_offsets(&self, start: usize, out: &mut [i32]) {
        let base = self.offsets[start];
        for (slot, offset) in out.iter_mut().zip(&self.offsets[start ..]) {
            *slot = offset - base;
        }
    }

    /// Copies the bytes of values `start..` into `out`.
    pub fn copy_values(&self, start: usize, out: &mut [u8]) {
        let bytes = &self.data[self.offsets[start] as usize ..];
        out[.. bytes.len()].copy_from_slice(bytes);
    }

    pub fn visit_values(&self, start: usize, mut visitor: impl FnMut(&[u8])) {
        for index in start .. self.size() {
            visitor(self.value(index as i32));
        }
    }
}

impl MemoTable for BinaryMemoTable {
    type Value<'a> = &'a [u8];

    fn get(&self, value: &[u8]) -> Option<i32> {
        self.index.probe(self.index.hash(value), |index| self.value(index) == value).1
    }

    fn get_or_insert<F, N>(&mut self, value: &[u8], on_found: F, on_not_found: N) -> Result<i32>
    where
        F: FnOnce(i32),
        N: FnOnce(i32) -> Result<()>,
    {
        let hash = self.index.hash(value);
        let (position, found) = self.index.probe(hash, |index| self.value(index) == value);
        if let Some(index) = found {
            on_found(index);
            return Ok(index);
        }

        let size = self.size();
        let index = size as i32;
        self.index.check_insert(size)?;
        let end = i32::try_from(self.data.len() + value.len())
            .map_err(|_| Error::capacity("memo table byte store would exceed 2 GiB"))?;
        let offsets_capacity = grown_capacity(self.offsets.capacity(), self.offsets.len() + 1);
        let data_capacity = grown_capacity(self.data.capacity(), end as usize);
        let bytes = Self::footprint(self.index.slots_for(size + 1), offsets_capacity, data_capacity);
        let charged = self.reservation.size();
        self.reservation.resize(bytes)?;
        if let Err(err) = on_not_found(index) {
            self.reservation.shrink_to(charged);
            return Err(err);
        }
        self.offsets.reserve_exact(offsets_capacity - self.offsets.len());
        self.data.reserve_exact(data_capacity - self.data.len());
        self.index.slots[position] = index;
        self.data.extend_from_slice(value);
        self.offsets.push(end);
        if self.index.needs_resize(self.size()) {
            let slots = self.index.grown(self.size(), |index| self.index.hash(self.value(index)));
            self.index.slots = slots;
        }
        Ok(index)
    }

    fn size(&self) -> usize { self.offsets.len() - 1 }

    fn reset(&mut self) {
        self.index.reset(self.initial_capacity);
        self.offsets = vec![0];
        self.data = Vec::new();
        let bytes = Self::footprint(self.capacity(), self.offsets.capacity(), 0);
        self.reservation.shrink_to(bytes);
    }
}

impl HeapSize for BinaryMemoTable {
    fn heap_size(&self) -> (usize, usize) {
        let (l0, c0) = self.index.slots.heap_size();
        let (l1, c1) = self.offsets.heap_size();
        let (l2, c2) = self.data.heap_size();
        (l0 + l1 + l2, c0 + c1 + c2)
    }
}
