pub(crate) mod frame;
pub(crate) mod function;
pub(crate) mod phys;
