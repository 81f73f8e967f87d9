pub mod table_container;

pub use table_container::{SearchState, TableContainer, TypeOption};
