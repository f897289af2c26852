//! Repositories — aggregate operations over the document stores.

pub mod calls;

pub use calls::CallRepository;
