pub(crate) mod adapter;
pub(crate) mod combine;
pub(crate) mod descriptor;
pub(crate) mod value;
