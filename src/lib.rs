#![warn(clippy::pedantic)]
// Noisy doc/signature lints: would require annotating every pub function
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference: keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Counts, capacities and timestamps cross integer widths on purpose
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
// Module structure: queue::DisplayQueue, filter::MessageFilter and friends
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod display;
pub mod errors;
pub mod filter;
pub mod gateway;
pub mod ledger;
pub mod message_log;
pub mod poller;
pub mod policy;
pub mod provider;
pub mod queue;
pub mod responder;
pub mod service;
pub(crate) mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
