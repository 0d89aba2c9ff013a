//! LlamaStack Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions owned by the LlamaStack operator.
//! Every Deployment and Service the operator manages carries a controller
//! owner reference back to one of these resources.

pub mod llama_stack_distribution;

pub use llama_stack_distribution::*;
