//! CSV batch surface: order requests in, per-request outcomes out.

pub mod outcome_writer;
pub mod request_reader;
