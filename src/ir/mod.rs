pub(crate) mod field;
pub(crate) mod program;
pub(crate) mod signal;
