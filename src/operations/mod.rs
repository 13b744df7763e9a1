mod operation;

pub use operation::{Operation, OperationError, Outcome};
