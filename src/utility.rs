use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

/// 使用ObjPtr<T>来代替裸指针,作为图结构中非所有权的句柄
/// 两个ObjPtr相等当且仅当它们指向同一个对象(身份相等,而不是内容相等)
pub struct ObjPtr<T>(NonNull<T>);

impl<T> ObjPtr<T> {
    pub fn new(ptr: &T) -> ObjPtr<T> {
        unsafe { ObjPtr(NonNull::new_unchecked(ptr as *const _ as *mut _)) }
    }

    pub fn as_ref<'a>(self) -> &'a T {
        unsafe { self.0.as_ref() }
    }

    /// 通过句柄修改对象,对象的所有权在ObjPool中
    pub fn as_mut<'a>(mut self) -> &'a mut T {
        unsafe { self.0.as_mut() }
    }
}

impl<T> Clone for ObjPtr<T> {
    fn clone(&self) -> Self {
        ObjPtr(self.0)
    }
}
impl<T> Copy for ObjPtr<T> {}

impl<T> PartialEq for ObjPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<T> Eq for ObjPtr<T> {}

impl<T> Hash for ObjPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl<T> std::ops::Deref for ObjPtr<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.as_ref()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_ref(), f)
    }
}

impl<T: fmt::Display> fmt::Display for ObjPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_ref(), f)
    }
}

/// 内存池,持有所有通过put分配的对象
/// 池被释放之后所有句柄失效
pub struct ObjPool<T> {
    data: Vec<NonNull<T>>,
}

impl<T> ObjPool<T> {
    pub fn new() -> ObjPool<T> {
        ObjPool { data: Vec::new() }
    }

    pub fn put(&mut self, obj: T) -> ObjPtr<T> {
        let ptr = Box::leak(Box::new(obj)).into();
        self.data.push(ptr);
        ObjPtr(ptr)
    }

    pub fn free_all(&mut self) {
        for ptr in self.data.drain(..) {
            unsafe {
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }
    }
}

impl<T> Drop for ObjPool<T> {
    fn drop(&mut self) {
        self.free_all()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_identity() {
        let mut pool = ObjPool::new();
        let a = pool.put(String::from("x"));
        let b = pool.put(String::from("x"));
        // 内容相同,身份不同
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn test_as_mut() {
        let mut pool = ObjPool::new();
        let a = pool.put(3);
        *a.as_mut() += 1;
        assert_eq!(*a.as_ref(), 4);
    }
}
