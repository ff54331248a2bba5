/// Engine serializing every exchange on one transport
pub(crate) mod engine;
pub(crate) mod operations;
pub(crate) mod requests;
