//! Runtime system
//!
//! This module contains the managed heap and thread interruption.

pub mod heap;
pub mod interrupt;
