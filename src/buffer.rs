//! Byte regions backing columnar arrays, and the pool that accounts for them.
//!
//! All storage is held in `u64` words, so that any fixed-width primitive view of a
//! buffer is a `bytemuck` cast rather than a copy. A [`MutableBuffer`] is grown by a
//! single owner and then frozen into a [`Buffer`], which is immutable and shared by
//! reference count. Each allocation reserves its capacity with a [`MemoryPool`] and
//! releases it on drop.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::native::NativeType;

/// An accounting interface for the bytes held by buffers.
pub trait MemoryPool: Send + Sync + fmt::Debug {
    /// Records `bytes` as allocated, or fails if the pool would exceed its limit.
    fn reserve(&self, bytes: usize) -> Result<()>;
    /// Returns `bytes` to the pool.
    fn release(&self, bytes: usize);
    /// Bytes currently reserved.
    fn bytes_allocated(&self) -> usize;
    /// The high-water mark of `bytes_allocated`.
    fn max_memory(&self) -> usize;
}

/// A shared handle to a memory pool.
pub type PoolRef = Arc<dyn MemoryPool>;

/// A pool backed by the system allocator, with an optional byte limit.
#[derive(Debug, Default)]
pub struct SystemPool {
    allocated: AtomicUsize,
    max: AtomicUsize,
    limit: Option<usize>,
}

impl SystemPool {
    pub fn new() -> Self { Self::default() }
    /// A pool that refuses reservations past `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit), ..Self::default() }
    }
    /// A fresh unlimited pool behind a shared handle.
    pub fn shared() -> PoolRef { Arc::new(Self::new()) }
}

impl MemoryPool for SystemPool {
    fn reserve(&self, bytes: usize) -> Result<()> {
        let mut current = self.allocated.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(bytes);
            if let Some(limit) = self.limit {
                if next > limit {
                    return Err(Error::OutOfMemory { requested: bytes, allocated: current, limit });
                }
            }
            match self.allocated.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => {
                    self.max.fetch_max(next, Ordering::Relaxed);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }
    fn release(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::AcqRel);
    }
    fn bytes_allocated(&self) -> usize { self.allocated.load(Ordering::Relaxed) }
    fn max_memory(&self) -> usize { self.max.load(Ordering::Relaxed) }
}

/// A pool charge for storage kept outside buffers, such as hash table slots.
///
/// The owner resizes the charge before growing its storage, and the charge is
/// released on drop.
#[derive(Debug)]
pub struct Reservation {
    pool: Option<PoolRef>,
    bytes: usize,
}

impl Reservation {
    /// An empty charge against `pool`.
    pub fn new(pool: &PoolRef) -> Self {
        Self { pool: Some(Arc::clone(pool)), bytes: 0 }
    }
    /// A reservation that charges no pool.
    pub fn unaccounted() -> Self {
        Self { pool: None, bytes: 0 }
    }

    /// Bytes currently charged.
    pub fn size(&self) -> usize { self.bytes }

    /// Sets the charge to `bytes`. Only growth can fail, leaving the charge unchanged.
    pub fn resize(&mut self, bytes: usize) -> Result<()> {
        if bytes > self.bytes {
            if let Some(pool) = &self.pool {
                pool.reserve(bytes - self.bytes)?;
            }
        } else {
            self.release_above(bytes);
        }
        self.bytes = bytes;
        Ok(())
    }

    /// Lowers the charge to `bytes` if it is larger.
    pub fn shrink_to(&mut self, bytes: usize) {
        if bytes < self.bytes {
            self.release_above(bytes);
            self.bytes = bytes;
        }
    }

    fn release_above(&self, bytes: usize) {
        if let Some(pool) = &self.pool {
            pool.release(self.bytes - bytes);
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.shrink_to(0);
    }
}

#[inline(always)]
fn words_for(bytes: usize) -> usize { (bytes + 7) / 8 }

/// Word storage plus its pool reservation.
struct Allocation {
    words: Vec<u64>,
    /// Length in bytes; at most `8 * words.len()`.
    len: usize,
    reserved: usize,
    pool: Option<PoolRef>,
}

impl Allocation {
    fn bytes(&self) -> &[u8] { &bytemuck::cast_slice(&self.words[..])[.. self.len] }
    fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut(&mut self.words[..])[.. len]
    }
    /// Ensures the word storage can hold `bytes`, reserving any growth with the pool.
    fn grow_to(&mut self, bytes: usize) -> Result<()> {
        let words = words_for(bytes);
        if words > self.words.capacity() {
            let target = std::cmp::max(words, self.words.capacity() * 2);
            let wanted = target * 8;
            if let Some(pool) = &self.pool {
                pool.reserve(wanted - self.reserved)?;
            }
            self.words.reserve_exact(target - self.words.len());
            self.reserved = wanted;
        }
        if words > self.words.len() {
            self.words.resize(words, 0);
        }
        Ok(())
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(pool) = &self.pool {
            pool.release(self.reserved);
        }
    }
}

/// A growable, 8-byte aligned byte region with a single owner.
pub struct MutableBuffer {
    inner: Allocation,
}

impl MutableBuffer {
    pub fn new(pool: &PoolRef) -> Self {
        Self { inner: Allocation { words: Vec::new(), len: 0, reserved: 0, pool: Some(Arc::clone(pool)) } }
    }
    pub fn with_capacity(bytes: usize, pool: &PoolRef) -> Result<Self> {
        let mut buffer = Self::new(pool);
        buffer.reserve(bytes)?;
        Ok(buffer)
    }
    /// A buffer of `len` zero bytes.
    pub fn zeroed(len: usize, pool: &PoolRef) -> Result<Self> {
        let mut buffer = Self::new(pool);
        buffer.resize(len)?;
        Ok(buffer)
    }
    /// Adopts already-filled words, accounting for their capacity.
    pub fn from_words(words: Vec<u64>, len: usize, pool: &PoolRef) -> Result<Self> {
        assert!(len <= words.len() * 8);
        let reserved = words.capacity() * 8;
        pool.reserve(reserved)?;
        Ok(Self { inner: Allocation { words, len, reserved, pool: Some(Arc::clone(pool)) } })
    }
    pub fn from_slice<T: NativeType>(values: &[T], pool: &PoolRef) -> Result<Self> {
        let mut buffer = Self::with_capacity(std::mem::size_of_val(values), pool)?;
        buffer.extend_from_slice(bytemuck::cast_slice(values))?;
        Ok(buffer)
    }

    #[inline] pub fn len(&self) -> usize { self.inner.len }
    #[inline] pub fn is_empty(&self) -> bool { self.inner.len == 0 }
    #[inline] pub fn capacity(&self) -> usize { self.inner.words.capacity() * 8 }

    /// Ensures room for `additional` more bytes without reallocating.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let len = self.inner.len;
        let words = self.inner.words.len();
        self.inner.grow_to(len + additional)?;
        // `grow_to` extends the word vector; only the capacity was asked for.
        self.inner.words.truncate(std::cmp::max(words, words_for(len)));
        Ok(())
    }
    /// Sets the length to `new_len`, zero-filling any new bytes.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.inner.len {
            self.inner.grow_to(new_len)?;
            let old = self.inner.len;
            self.inner.len = new_len;
            self.inner.bytes_mut()[old ..].fill(0);
        } else {
            self.truncate(new_len);
        }
        Ok(())
    }
    pub fn truncate(&mut self, len: usize) {
        if len < self.inner.len {
            self.inner.len = len;
            self.inner.words.truncate(words_for(len));
        }
    }
    pub fn clear(&mut self) { self.truncate(0) }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        let old = self.inner.len;
        self.inner.grow_to(old + bytes.len())?;
        self.inner.len = old + bytes.len();
        self.inner.bytes_mut()[old ..].copy_from_slice(bytes);
        Ok(())
    }
    pub fn push<T: NativeType>(&mut self, value: T) -> Result<()> {
        self.extend_from_slice(bytemuck::bytes_of(&value))
    }

    #[inline] pub fn as_slice(&self) -> &[u8] { self.inner.bytes() }
    #[inline] pub fn as_mut_slice(&mut self) -> &mut [u8] { self.inner.bytes_mut() }

    /// The buffer viewed as whole elements of `T`; a trailing partial element is not shown.
    pub fn typed_data<T: NativeType>(&self) -> &[T] {
        let count = self.inner.len / std::mem::size_of::<T>();
        &bytemuck::cast_slice(&self.inner.words[..])[.. count]
    }
    pub fn typed_data_mut<T: NativeType>(&mut self) -> &mut [T] {
        let count = self.inner.len / std::mem::size_of::<T>();
        &mut bytemuck::cast_slice_mut(&mut self.inner.words[..])[.. count]
    }

    /// Converts into an immutable, shareable buffer without copying.
    pub fn freeze(self) -> Buffer {
        Buffer { inner: Arc::new(self.inner) }
    }
}

impl fmt::Debug for MutableBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableBuffer").field("len", &self.len()).field("capacity", &self.capacity()).finish()
    }
}

/// An immutable byte region, shared by reference count.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<Allocation>,
}

impl Buffer {
    /// A zero-length buffer that holds no reservation.
    pub fn empty() -> Self {
        Self { inner: Arc::new(Allocation { words: Vec::new(), len: 0, reserved: 0, pool: None }) }
    }
    pub fn from_slice<T: NativeType>(values: &[T], pool: &PoolRef) -> Result<Self> {
        Ok(MutableBuffer::from_slice(values, pool)?.freeze())
    }
    pub fn from_bytes(bytes: &[u8], pool: &PoolRef) -> Result<Self> {
        let mut buffer = MutableBuffer::with_capacity(bytes.len(), pool)?;
        buffer.extend_from_slice(bytes)?;
        Ok(buffer.freeze())
    }

    #[inline] pub fn len(&self) -> usize { self.inner.len }
    #[inline] pub fn is_empty(&self) -> bool { self.inner.len == 0 }
    #[inline] pub fn as_slice(&self) -> &[u8] { self.inner.bytes() }
    /// The address of the first byte, for identity comparisons.
    #[inline] pub fn as_ptr(&self) -> *const u8 { self.inner.words.as_ptr() as *const u8 }

    pub fn typed_data<T: NativeType>(&self) -> &[T] {
        let count = self.inner.len / std::mem::size_of::<T>();
        &bytemuck::cast_slice(&self.inner.words[..])[.. count]
    }

    /// Whether both handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &Buffer) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

    /// Mutable access to the bytes, available only while this handle is the sole owner.
    pub fn get_mut(&mut self) -> Option<&mut [u8]> {
        Arc::get_mut(&mut self.inner).map(|inner| inner.bytes_mut())
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] { self.as_slice() }
}

impl Default for Buffer {
    fn default() -> Self { Self::empty() }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool { self.as_slice() == other.as_slice() }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer").field("len", &self.len()).field("data", &self.as_slice()).finish()
    }
}

impl crate::common::HeapSize for Buffer {
    fn heap_size(&self) -> (usize, usize) { (self.len(), self.inner.words.capacity() * 8) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn freeze_and_share() {
        let pool = SystemPool::shared();
        let mut buffer = MutableBuffer::new(&pool);
        for i in 0 .. 10i32 {
            buffer.push(i).unwrap();
        }
        assert_eq!(buffer.len(), 40);
        assert_eq!(buffer.typed_data::<i32>()[7], 7);

        let frozen = buffer.freeze();
        let shared = frozen.clone();
        assert!(frozen.ptr_eq(&shared));
        assert_eq!(frozen.as_ptr(), shared.as_ptr());
        assert_eq!(shared.typed_data::<i32>(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn get_mut_requires_sole_owner() {
        let pool = SystemPool::shared();
        let mut buffer = MutableBuffer::zeroed(16, &pool).unwrap().freeze();
        let other = buffer.clone();
        assert!(buffer.get_mut().is_none());
        drop(other);
        let ptr = buffer.as_ptr();
        buffer.get_mut().unwrap()[3] = 9;
        assert_eq!(buffer.as_slice()[3], 9);
        assert_eq!(buffer.as_ptr(), ptr);
    }

    #[test]
    fn pool_accounting() {
        let pool: PoolRef = Arc::new(SystemPool::new());
        {
            let buffer = MutableBuffer::with_capacity(100, &pool).unwrap();
            assert!(pool.bytes_allocated() >= 100);
            let frozen = buffer.freeze();
            let _copy = frozen.clone();
        }
        assert_eq!(pool.bytes_allocated(), 0);
        assert!(pool.max_memory() >= 100);
    }

    #[test]
    fn pool_limit() {
        let pool: PoolRef = Arc::new(SystemPool::with_limit(64));
        assert!(MutableBuffer::with_capacity(64, &pool).is_ok());
        let err = MutableBuffer::with_capacity(65, &pool).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OutOfMemory);
    }

    #[test]
    fn resize_zero_fills() {
        let pool = SystemPool::shared();
        let mut buffer = MutableBuffer::new(&pool);
        buffer.extend_from_slice(&[1, 2, 3]).unwrap();
        buffer.truncate(1);
        buffer.resize(5).unwrap();
        assert_eq!(buffer.as_slice(), &[1, 0, 0, 0, 0]);
    }

    #[test]
    fn reservation_follows_resizes() {
        let pool: PoolRef = Arc::new(SystemPool::with_limit(100));
        let mut reservation = Reservation::new(&pool);
        reservation.resize(60).unwrap();
        assert_eq!(pool.bytes_allocated(), 60);
        let err = reservation.resize(120).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OutOfMemory);
        assert_eq!(reservation.size(), 60);
        reservation.resize(40).unwrap();
        reservation.shrink_to(50);
        assert_eq!(pool.bytes_allocated(), 40);
        drop(reservation);
        assert_eq!(pool.bytes_allocated(), 0);
        assert_eq!(pool.max_memory(), 60);
    }
}
