pub mod error;
pub mod record;
pub mod types;
pub mod value;

pub use error::{ConflictKind, DbError, Result};
pub use record::{FieldAccess, FieldMap, Record, RowId};
pub use types::Column;
pub use value::{DataType, Value};
