//! Tree construction, sparsification, and wire serialization.

mod builder;
mod sparsify;
mod tree;
pub mod wire;


pub use builder::{construct_tree, construct_trees_batch, BatchResult};
pub use sparsify::{
    sparsify, sparsify_mutations, SparseView, SparsifyParams, ViewMutation, ViewNode,
    ViewportParams,
};
pub use tree::{TreeGraph, NULL_PARENT};
