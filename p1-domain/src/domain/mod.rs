pub mod reading;

pub use reading::{FieldName, Reading};
