//! OBD-II Poller
//!
//! Repeatedly queries a list of mode 01 PIDs through an [`ElmClient`] and
//! reports one labelled reading per PID. A failing PID is reported and
//! polling moves on to the next one.
//!
//! [`ElmClient`]: elm_protocol::ElmClient

mod poller;

pub use poller::{PidReading, PollTarget, Poller, PollerConfig};
