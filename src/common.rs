//! Common traits that are re-used throughout the crate.

/// A type with a length.
pub trait Len {
    /// The number of contained elements.
    fn len(&self) -> usize;
    /// Whether this contains no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
impl<L: Len + ?Sized> Len for &L {
    #[inline(always)] fn len(&self) -> usize { L::len(*self) }
}
impl<L: Len + ?Sized> Len for &mut L {
    #[inline(always)] fn len(&self) -> usize { L::len(*self) }
}
impl<T> Len for Vec<T> {
    #[inline(always)] fn len(&self) -> usize { self.len() }
}
impl<T> Len for [T] {
    #[inline(always)] fn len(&self) -> usize { <[T]>::len(self) }
}

/// A type that can remove its contents and return to an empty state.
///
/// Generally, this method does not release resources, and is used to make the container available for re-insertion.
pub trait Clear {
    /// Clears `self`, without changing its capacity.
    fn clear(&mut self);
}
// Vectors can be cleared.
impl<T> Clear for Vec<T> {
    #[inline(always)] fn clear(&mut self) { self.clear() }
}

pub trait HeapSize {
    /// Active (len) and allocated (cap) heap sizes in bytes.
    /// This should not include the size of `self` itself.
    fn heap_size(&self) -> (usize, usize) { (0, 0) }
}

macro_rules! implement_heap_size {
    ($($t:ty),*) => { $( impl HeapSize for $t { } )* }
}
implement_heap_size!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, half::f16, bool);

impl<T: HeapSize> HeapSize for [T] {
    fn heap_size(&self) -> (usize, usize) {
        let mut l = std::mem::size_of_val(self);
        let mut c = std::mem::size_of_val(self);
        for item in self.iter() {
            let (il, ic) = item.heap_size();
            l += il;
            c += ic;
        }
        (l, c)
    }
}
impl<T: HeapSize> HeapSize for Vec<T> {
    fn heap_size(&self) -> (usize, usize) {
        let mut l = std::mem::size_of::<T>() * self.len();
        let mut c = std::mem::size_of::<T>() * self.capacity();
        for item in (self[..]).iter() {
            let (il, ic) = item.heap_size();
            l += il;
            c += ic;
        }
        (l, c)
    }
}
