//! Per-face explanation: guided-backprop attribution, label-dependent
//! shaping and compositing back onto the source frame.

pub mod attribute;
pub mod composite;
pub mod postprocess;
