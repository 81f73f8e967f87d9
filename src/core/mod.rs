pub mod stopwords;
pub mod table;
pub mod types;
pub mod visualization;

pub use stopwords::{Language, StopwordSet};
pub use table::{Row, Table, TableError, TableSource};
pub use types::*;
pub use visualization::*;
