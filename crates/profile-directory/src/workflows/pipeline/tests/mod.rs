pub(crate) mod common;
mod reconciler;
