use core::cell::Cell;

use critical_section::Mutex;

/// A cell holding a `Copy` value which can be shared between threads
///
/// Every access happens inside a critical section, so it is only suitable for small values which
/// are read or replaced as a whole.
#[derive(Debug)]
pub struct AtomicCell<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Copy> AtomicCell<T> {
    /// Create a new AtomicCell holding `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value
    pub fn load(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Replace the current value
    pub fn store(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value))
    }

    /// Replace the current value, returning the previous one
    pub fn swap(&self, value: T) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).replace(value))
    }

    /// Apply `f` to the current value and store the result, returning the new value
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let new = f(cell.get());
            cell.set(new);
            new
        })
    }
}

impl<T: Copy + Default> AtomicCell<T> {
    /// Read the current value, leaving the default value in its place
    pub fn take(&self) -> T {
        self.swap(T::default())
    }
}
