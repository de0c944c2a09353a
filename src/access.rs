pub mod btree;
pub mod heap;
pub mod tuple;
pub mod value;

pub use btree::BPlusTree;
pub use heap::{TableHeap, TableScan};
pub use tuple::{RecordId, Tuple};
pub use value::{DataType, Value};
