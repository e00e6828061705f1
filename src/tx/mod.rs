//! Transaction construction
//!
//! This module provides:
//! - Linear fee and minimum-output-value math
//! - The transaction builder: one handler per action kind, iterative fee
//!   convergence, balance verification

pub mod builder;
pub mod fees;

pub use builder::{TransactionBuilder, UnsignedTransaction, WalletContext};
pub use fees::FeeParams;
