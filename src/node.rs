use std::{rc::Rc, sync::Arc};

/// Anything that can be placed on the ring.
///
/// The ring looks at nothing but the key: it must be stable for the lifetime
/// of the registration and unique among registered nodes. An empty key is
/// treated as "no node" and rejected by `add`.
pub trait Node {
    fn key(&self) -> &str;
}

impl Node for str {
    fn key(&self) -> &str {
        self
    }
}

impl Node for String {
    fn key(&self) -> &str {
        self.as_str()
    }
}

impl<T: Node + ?Sized> Node for &T {
    fn key(&self) -> &str {
        (**self).key()
    }
}

impl<T: Node + ?Sized> Node for Box<T> {
    fn key(&self) -> &str {
        (**self).key()
    }
}

impl<T: Node + ?Sized> Node for Arc<T> {
    fn key(&self) -> &str {
        (**self).key()
    }
}

impl<T: Node + ?Sized> Node for Rc<T> {
    fn key(&self) -> &str {
        (**self).key()
    }
}
