pub(crate) mod filter;
pub(crate) mod metadata;
pub(crate) mod staging;
pub(crate) mod uri;
pub(crate) mod validate;
