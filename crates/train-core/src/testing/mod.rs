//! Host implementations for tests and simulations.

mod page;

pub use page::{Page, Window};
