mod index;
mod slice;
mod sparse;

pub use index::NameIndex;
pub use slice::AxisSelect;
pub use sparse::{csr_from_coo, csr_select};
