use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

/// A handle to an evaluator-owned entity: a struct instance, an array, a
/// map, or a module scope. Values hold handles, so cloning one never
/// copies the entity behind it, and two clones denote the same entity.
/// Reference comparison in the language is exactly [`Handle::same`].
#[derive(Debug, Default)]
pub struct Handle<T> {
	entity: Rc<RefCell<T>>,
}

impl<T> Handle<T> {
	pub fn new(entity: T) -> Self { Self { entity: Rc::new(RefCell::new(entity)) } }

	pub fn borrow(&self) -> Ref<'_, T> { self.entity.borrow() }

	pub fn borrow_mut(&self) -> RefMut<'_, T> { self.entity.borrow_mut() }

	/// Do both handles name the same entity?
	pub fn same(&self, other: &Self) -> bool { Rc::ptr_eq(&self.entity, &other.entity) }
}

// Derived Clone would demand `T: Clone`; a handle copies regardless.
impl<T> Clone for Handle<T> {
	fn clone(&self) -> Self { Self { entity: self.entity.clone() } }
}
