pub(crate) mod element;
