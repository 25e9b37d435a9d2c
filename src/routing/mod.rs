//! Channel routing: where orders live, which candidates may serve them, and
//! in what order they are tried.

pub mod catalog;
pub mod failure_counter;
pub mod health;
pub mod ranker;
pub mod table_router;
pub mod weighted;
