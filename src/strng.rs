//! Cheap immutable strings, shared by reference count.

pub use arcstr::{format, literal};

pub type Strng = arcstr::ArcStr;

pub fn new<A: AsRef<str>>(s: A) -> Strng {
	arcstr::ArcStr::from(s.as_ref())
}
